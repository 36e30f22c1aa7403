use super::frames::FrameId;
use crate::eval::{Evaluator, Scope};
use crate::spec::Spec;
use crate::value::{summary, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeKind {
    Context,
    State,
    NextState,
    Constants,
}

impl ScopeKind {
    pub fn label(self) -> &'static str {
        match self {
            ScopeKind::Context => "Context",
            ScopeKind::State => "State",
            ScopeKind::NextState => "Next state",
            ScopeKind::Constants => "Constants",
        }
    }
}

/// Raw bindings of one scope. Lazy values stay unforced until rendered.
#[derive(Debug, Clone)]
pub struct BindingGroup {
    pub scope: ScopeKind,
    pub bindings: Vec<(Arc<str>, Value)>,
}

/// Collects a frame's visible bindings: locals in declaration order, then the
/// current state, the next state (names primed) and the constants.
pub fn materialize(scope: &Scope, spec: &Spec) -> Vec<BindingGroup> {
    let mut groups = vec![BindingGroup {
        scope: ScopeKind::Context,
        bindings: scope.context.visible_bindings(),
    }];
    if let Some(state) = scope.level.current() {
        groups.push(BindingGroup {
            scope: ScopeKind::State,
            bindings: state.iter().map(|(n, v)| (n.clone(), v.clone())).collect(),
        });
    }
    if let Some(next) = scope.level.next() {
        groups.push(BindingGroup {
            scope: ScopeKind::NextState,
            bindings: next
                .iter()
                .map(|(n, v)| (Arc::from(format!("{}'", n)), v.clone()))
                .collect(),
        });
    }
    if !spec.constants().is_empty() {
        groups.push(BindingGroup {
            scope: ScopeKind::Constants,
            bindings: spec.constants().to_vec(),
        });
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub type_tag: &'static str,
    /// Present for non-empty aggregates; expand it for the elements.
    pub handle: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum HandleTarget {
    Scope { frame: FrameId, index: usize },
    Value(Value),
}

/// Opaque references handed to clients. Valid until the evaluator resumes.
#[derive(Debug)]
pub struct HandleTable {
    next: u64,
    targets: HashMap<u64, HandleTarget>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next: 1,
            targets: HashMap::new(),
        }
    }

    pub fn insert(&mut self, target: HandleTarget) -> u64 {
        let handle = self.next;
        self.next += 1;
        self.targets.insert(handle, target);
        handle
    }

    pub fn get(&self, handle: u64) -> Option<&HandleTarget> {
        self.targets.get(&handle)
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }
}

/// Renders one binding. Deferred values are forced with frames suppressed;
/// a failure is shown in place of the value.
pub fn render(
    name: &str,
    value: &Value,
    evaluator: &Evaluator,
    handles: &mut HandleTable,
    inline_limit: usize,
) -> Variable {
    let shown = match evaluator.force_for_display(value) {
        Ok(shown) => shown,
        Err(err) => {
            return Variable {
                name: name.to_string(),
                value: format!("<error: {}>", err),
                type_tag: value.type_tag(),
                handle: None,
            }
        }
    };
    let handle = match shown.len() {
        Some(n) if n > 0 => Some(handles.insert(HandleTarget::Value(shown.clone()))),
        _ => None,
    };
    Variable {
        name: name.to_string(),
        value: summary(&shown, inline_limit),
        type_tag: shown.type_tag(),
        handle,
    }
}
