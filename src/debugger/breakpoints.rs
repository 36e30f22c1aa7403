use crate::syntax::SourceLocation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    pub module: Arc<str>,
    pub line: u32,
    pub enabled: bool,
}

/// Line breakpoints keyed by (module, line); setting the same line twice keeps one entry.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    points: BTreeMap<(Arc<str>, u32), bool>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, module: &str, line: u32) {
        self.points.insert((Arc::from(module), line), true);
        debug!(module, line, "breakpoint set");
    }

    pub fn unset(&mut self, module: &str, line: u32) -> bool {
        let removed = self.points.remove(&(Arc::from(module), line)).is_some();
        if removed {
            debug!(module, line, "breakpoint removed");
        }
        removed
    }

    pub fn unset_all(&mut self) {
        self.points.clear();
    }

    /// Drops every breakpoint in `module` and installs `lines` instead.
    pub fn replace(&mut self, module: &str, lines: &[u32]) {
        self.points.retain(|(m, _), _| &**m != module);
        for &line in lines {
            self.set(module, line);
        }
    }

    /// Returns false when no breakpoint exists at that line.
    pub fn set_enabled(&mut self, module: &str, line: u32, enabled: bool) -> bool {
        match self.points.get_mut(&(Arc::from(module), line)) {
            Some(flag) => {
                *flag = enabled;
                true
            }
            None => false,
        }
    }

    /// True if an enabled breakpoint in the same module falls on a line the location spans.
    pub fn contains(&self, location: &SourceLocation) -> bool {
        if location.begin.line > location.end.line {
            return false;
        }
        let from = (location.module.clone(), location.begin.line);
        let to = (location.module.clone(), location.end.line);
        self.points.range(from..=to).any(|(_, enabled)| *enabled)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn list(&self) -> Vec<Breakpoint> {
        self.points
            .iter()
            .map(|((module, line), enabled)| Breakpoint {
                module: module.clone(),
                line: *line,
                enabled: *enabled,
            })
            .collect()
    }
}
