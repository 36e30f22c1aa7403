use serde::Serialize;

/// How the evaluator proceeds after it is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run until a breakpoint.
    Continue,
    /// Stop after this many further frame pushes.
    StepIn { remaining: u32 },
    /// Stop at the next push that lands at or above the paused depth.
    StepOver { depth: usize },
    /// Stop at the next push that lands above the paused depth.
    StepOut { depth: usize },
}

impl RunMode {
    /// Accounts for one traced push. `depth` is the stack depth including the
    /// new frame.
    pub fn on_push(&mut self, depth: usize) -> bool {
        match self {
            RunMode::Continue => false,
            RunMode::StepIn { remaining } => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            RunMode::StepOver { depth: paused } => depth <= *paused,
            RunMode::StepOut { depth: paused } => depth < *paused,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Entry,
    Breakpoint,
    Step,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Entry => "entry",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Step => "step",
        }
    }
}
