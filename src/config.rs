use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_INLINE_LIMIT: usize = 16;
/// Nested operator calls allowed before evaluation fails.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 2_000;
/// Stack reserved for threads that run the evaluator.
pub const EVALUATOR_STACK_SIZE: usize = 512 * 1024 * 1024;

/// What happens to a suspended evaluation when the client goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum DisconnectPolicy {
    /// Drop all breakpoints and let the evaluation finish unattended.
    Release,
    /// Fail the evaluation at its next frame push.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerConfig {
    pub stop_on_entry: bool,
    pub disconnect_policy: DisconnectPolicy,
    /// Aggregates with more elements than this are summarized inline.
    pub inline_limit: usize,
    pub max_call_depth: usize,
}

impl DebuggerConfig {
    pub fn new(disconnect_policy: DisconnectPolicy) -> Self {
        Self {
            stop_on_entry: true,
            disconnect_policy,
            inline_limit: DEFAULT_INLINE_LIMIT,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_stop_on_entry(mut self, stop_on_entry: bool) -> Self {
        self.stop_on_entry = stop_on_entry;
        self
    }

    pub fn with_inline_limit(mut self, inline_limit: usize) -> Self {
        self.inline_limit = inline_limit;
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }
}

fn default_true() -> bool {
    true
}

/// `launch` request arguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    pub program: PathBuf,
    #[serde(default = "default_true")]
    pub stop_on_entry: bool,
    #[serde(default)]
    pub disconnect_policy: Option<DisconnectPolicy>,
    #[serde(default)]
    pub inline_limit: Option<usize>,
    #[serde(default)]
    pub max_call_depth: Option<usize>,
}

impl LaunchArguments {
    /// `fallback` applies when the client does not name a disconnect policy.
    pub fn config(&self, fallback: DisconnectPolicy) -> DebuggerConfig {
        DebuggerConfig::new(self.disconnect_policy.unwrap_or(fallback))
            .with_stop_on_entry(self.stop_on_entry)
            .with_inline_limit(self.inline_limit.unwrap_or(DEFAULT_INLINE_LIMIT))
            .with_max_call_depth(self.max_call_depth.unwrap_or(DEFAULT_MAX_CALL_DEPTH))
    }
}
