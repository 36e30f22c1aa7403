//! Expression evaluation with frame reporting.

pub(crate) mod builtins;
mod context;
mod evaluator;
mod hook;
mod state;

pub use context::Context;
pub use evaluator::Evaluator;
pub use hook::{FrameHook, FrameKind, FramePush, NoopHook};
pub use state::{Scope, State, StateLevel};
