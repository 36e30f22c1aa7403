//! Suspension, stepping and inspection of a running evaluation.

mod breakpoints;
mod controller;
mod frames;
mod session;
mod stepping;
mod variables;

pub use breakpoints::{Breakpoint, BreakpointRegistry};
pub use controller::{DebugController, DebugEvent, ExecutionState};
pub use frames::{Frame, FrameId, StackFrameTracker};
pub use session::{DebugSession, FrameView, ScopeView};
pub use stepping::{RunMode, StopReason};
pub use variables::{BindingGroup, HandleTable, ScopeKind, Variable};
