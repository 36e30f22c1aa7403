use super::{Scope, StateLevel};
use crate::error::EvalResult;
use crate::syntax::SourceLocation;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameKind {
    Expression,
    StateFrame,
    ActionFrame,
}

impl FrameKind {
    pub fn for_level(level: &StateLevel) -> Self {
        match level {
            StateLevel::Constant => FrameKind::Expression,
            StateLevel::State(_) => FrameKind::StateFrame,
            StateLevel::Action(..) => FrameKind::ActionFrame,
        }
    }
}

/// Announced to the hook before the evaluator recurses into a steppable construct.
#[derive(Debug, Clone)]
pub struct FramePush {
    pub location: SourceLocation,
    pub kind: FrameKind,
    pub name: String,
    pub scope: Scope,
}

/// Observer of the evaluator's steppable recursion. `push` may block (a
/// debugger suspending the evaluation) and fails only when the session is
/// aborted; every successful `push` is matched by exactly one `pop`.
pub trait FrameHook: Send + Sync {
    fn push(&self, frame: FramePush) -> EvalResult<()>;
    fn pop(&self);
}

/// Hook for plain checking runs.
pub struct NoopHook;

impl FrameHook for NoopHook {
    fn push(&self, _frame: FramePush) -> EvalResult<()> {
        Ok(())
    }

    fn pop(&self) {}
}

/// Pops the frame when evaluation of the construct ends, including via `?`.
pub(crate) struct PushedFrame<'a> {
    hook: &'a dyn FrameHook,
}

impl<'a> PushedFrame<'a> {
    pub(crate) fn new(hook: &'a dyn FrameHook) -> Self {
        Self { hook }
    }
}

impl Drop for PushedFrame<'_> {
    fn drop(&mut self) {
        self.hook.pop();
    }
}
