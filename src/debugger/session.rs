use super::breakpoints::Breakpoint;
use super::controller::{DebugController, DebugEvent, ExecutionState};
use super::frames::{Frame, FrameId};
use super::variables::{self, HandleTable, HandleTarget, ScopeKind, Variable};
use crate::checker::{Checker, Verdict};
use crate::config::{DebuggerConfig, DisconnectPolicy, EVALUATOR_STACK_SIZE};
use crate::error::ProtocolError;
use crate::eval::{Evaluator, FrameHook, FrameKind};
use crate::spec::Spec;
use crate::value::Value;
use serde::Serialize;
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameView {
    pub id: FrameId,
    pub parent: Option<FrameId>,
    pub name: String,
    pub module: String,
    pub begin_line: u32,
    pub begin_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub kind: FrameKind,
}

impl From<&Frame> for FrameView {
    fn from(frame: &Frame) -> Self {
        Self {
            id: frame.id,
            parent: frame.parent,
            name: frame.name.clone(),
            module: frame.location.module.to_string(),
            begin_line: frame.location.begin.line,
            begin_column: frame.location.begin.column,
            end_line: frame.location.end.line,
            end_column: frame.location.end.column,
            kind: frame.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeView {
    pub name: &'static str,
    pub kind: ScopeKind,
    pub handle: u64,
    pub count: usize,
}

/// One debugged checking run: the evaluator thread plus everything a client
/// needs to drive and inspect it.
pub struct DebugSession {
    spec: Arc<Spec>,
    config: DebuggerConfig,
    controller: Arc<DebugController>,
    evaluator: Arc<Evaluator>,
    events: Option<Receiver<DebugEvent>>,
    worker: Option<JoinHandle<Verdict>>,
    handles: HandleTable,
    verdict: Option<Verdict>,
}

impl DebugSession {
    pub fn new(spec: Arc<Spec>, config: DebuggerConfig) -> Self {
        let (tx, rx) = channel();
        let controller = Arc::new(DebugController::new(config.stop_on_entry, tx));
        let hook: Arc<dyn FrameHook> = controller.clone();
        let evaluator = Arc::new(Evaluator::new(Arc::clone(&spec), hook).with_max_call_depth(config.max_call_depth));
        Self {
            spec,
            config,
            controller,
            evaluator,
            events: Some(rx),
            worker: None,
            handles: HandleTable::new(),
            verdict: None,
        }
    }

    pub fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    pub fn state(&self) -> ExecutionState {
        self.controller.state()
    }

    /// Starts checking on a dedicated evaluator thread.
    pub fn launch(&mut self) -> Result<(), ProtocolError> {
        if self.worker.is_some() {
            return Err(ProtocolError::InvalidArguments(
                "the session is already running".to_string(),
            ));
        }
        let evaluator = Arc::clone(&self.evaluator);
        let controller = Arc::clone(&self.controller);
        let worker = thread::Builder::new()
            .name("evaluator".to_string())
            .stack_size(EVALUATOR_STACK_SIZE)
            .spawn(move || {
                let verdict = Checker::new(evaluator).run();
                controller.terminate(verdict.clone());
                verdict
            })
            .map_err(|e| ProtocolError::Launch(e.to_string()))?;
        self.worker = Some(worker);
        info!(root = self.spec.root(), "session launched");
        Ok(())
    }

    fn check_location(&self, module: &str, lines: &[u32]) -> Result<(), ProtocolError> {
        let invalid = |line: u32| ProtocolError::InvalidBreakpointLocation {
            module: module.to_string(),
            line,
        };
        if self.spec.module(module).is_none() {
            return Err(invalid(lines.first().copied().unwrap_or(0)));
        }
        match lines.iter().find(|&&line| line == 0) {
            Some(&line) => Err(invalid(line)),
            None => Ok(()),
        }
    }

    /// Replaces the breakpoints of `module` with `lines`.
    pub fn set_breakpoints(&self, module: &str, lines: &[u32]) -> Result<Vec<Breakpoint>, ProtocolError> {
        self.check_location(module, lines)?;
        self.controller.with_breakpoints(|registry| registry.replace(module, lines));
        Ok(self
            .controller
            .breakpoints()
            .into_iter()
            .filter(|b| &*b.module == module)
            .collect())
    }

    pub fn add_breakpoint(&self, module: &str, line: u32) -> Result<(), ProtocolError> {
        self.check_location(module, &[line])?;
        self.controller.with_breakpoints(|registry| registry.set(module, line));
        Ok(())
    }

    pub fn unset_breakpoints(&self) {
        self.controller.with_breakpoints(|registry| registry.unset_all());
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.controller.breakpoints()
    }

    pub fn continue_(&mut self) -> Result<(), ProtocolError> {
        self.controller.continue_()?;
        self.handles.clear();
        Ok(())
    }

    pub fn step_in(&mut self, count: u32) -> Result<(), ProtocolError> {
        self.controller.step_in(count)?;
        self.handles.clear();
        Ok(())
    }

    pub fn step_over(&mut self) -> Result<(), ProtocolError> {
        self.controller.step_over()?;
        self.handles.clear();
        Ok(())
    }

    pub fn step_out(&mut self) -> Result<(), ProtocolError> {
        self.controller.step_out()?;
        self.handles.clear();
        Ok(())
    }

    /// Next stop or termination, or `None` on timeout or once the receiver
    /// has been handed out with [`DebugSession::take_events`].
    pub fn next_event(&mut self, timeout: Duration) -> Option<DebugEvent> {
        let event = self.events.as_ref()?.recv_timeout(timeout).ok()?;
        self.observe(&event);
        Some(event)
    }

    /// Blocks until the next stop or termination.
    pub fn wait_event(&mut self) -> Option<DebugEvent> {
        let event = self.events.as_ref()?.recv().ok()?;
        self.observe(&event);
        Some(event)
    }

    fn observe(&mut self, event: &DebugEvent) {
        if let DebugEvent::Terminated { verdict } = event {
            self.verdict = Some(verdict.clone());
        }
    }

    /// Hands the event stream to a forwarding thread.
    pub fn take_events(&mut self) -> Option<Receiver<DebugEvent>> {
        self.events.take()
    }

    pub fn stack_trace(&self) -> Result<Vec<FrameView>, ProtocolError> {
        Ok(self
            .controller
            .snapshot()?
            .iter()
            .map(|frame| FrameView::from(&**frame))
            .collect())
    }

    pub fn scopes(&mut self, frame_id: FrameId) -> Result<Vec<ScopeView>, ProtocolError> {
        let frame = self.controller.frame(frame_id)?;
        let spec = &self.spec;
        let groups = frame.bindings_or_init(|scope| variables::materialize(scope, spec));
        Ok(groups
            .iter()
            .enumerate()
            .map(|(index, group)| ScopeView {
                name: group.scope.label(),
                kind: group.scope,
                handle: self.handles.insert(HandleTarget::Scope {
                    frame: frame_id,
                    index,
                }),
                count: group.bindings.len(),
            })
            .collect())
    }

    /// Every binding visible in the frame, scope by scope.
    pub fn variables(&mut self, frame_id: FrameId) -> Result<Vec<Variable>, ProtocolError> {
        let frame = self.controller.frame(frame_id)?;
        let spec = &self.spec;
        let groups = frame.bindings_or_init(|scope| variables::materialize(scope, spec));
        let mut rendered = Vec::new();
        for group in groups {
            for (name, value) in &group.bindings {
                rendered.push(self.render(name, value));
            }
        }
        Ok(rendered)
    }

    /// Children of a scope or aggregate handle.
    pub fn expand(&mut self, handle: u64) -> Result<Vec<Variable>, ProtocolError> {
        let target = self
            .handles
            .get(handle)
            .cloned()
            .ok_or(ProtocolError::UnknownHandle(handle))?;
        match target {
            HandleTarget::Scope { frame, index } => {
                let frame = self.controller.frame(frame)?;
                let spec = &self.spec;
                let groups = frame.bindings_or_init(|scope| variables::materialize(scope, spec));
                let group = groups.get(index).ok_or(ProtocolError::UnknownHandle(handle))?;
                Ok(group
                    .bindings
                    .iter()
                    .map(|(name, value)| self.render(name, value))
                    .collect())
            }
            HandleTarget::Value(value) => Ok(value
                .children()
                .iter()
                .map(|(name, child)| self.render(name, child))
                .collect()),
        }
    }

    fn render(&mut self, name: &str, value: &Value) -> Variable {
        variables::render(
            name,
            value,
            &self.evaluator,
            &mut self.handles,
            self.config.inline_limit,
        )
    }

    /// Detaches the client. `policy` overrides the configured one.
    pub fn disconnect(&mut self, policy: Option<DisconnectPolicy>) -> Option<Verdict> {
        match policy.unwrap_or(self.config.disconnect_policy) {
            DisconnectPolicy::Release => self.controller.release(),
            DisconnectPolicy::Abort => self.controller.abort(),
        }
        self.join()
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    fn join(&mut self) -> Option<Verdict> {
        let worker = self.worker.take()?;
        match worker.join() {
            Ok(verdict) => {
                self.verdict = Some(verdict.clone());
                Some(verdict)
            }
            Err(_) => {
                warn!("evaluator thread panicked");
                None
            }
        }
    }
}

impl Drop for DebugSession {
    /// A session dropped while running detaches with its configured policy.
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.disconnect(None);
        }
    }
}
