use crate::tools::ToolResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the tool loop terminated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum LoopStopReason {
    /// The backend answered without requesting more tool calls.
    Completed,
    /// The configured iteration limit was reached.
    IterationCapExceeded,
    /// The per-session rate ceiling was hit; no further backend calls.
    RateLimitExhausted,
    /// The backend call itself failed.
    Fatal(String),
}

impl LoopStopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::IterationCapExceeded => "iteration_cap_exceeded",
            Self::RateLimitExhausted => "rate_limit_exhausted",
            Self::Fatal(_) => "fatal",
        }
    }
}

impl fmt::Display for LoopStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal(detail) => write!(f, "fatal: {detail}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Record of a single proposed action and what became of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
    /// Label of the gating verdict (`allowed`, `blocked`,
    /// `requires_confirmation`), or `none` when gating never ran.
    pub verdict: String,
    pub result: ToolResult,
    pub iteration: u32,
}

/// Final output of a [`crate::agent::ToolLoop::run`] invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub final_text: String,
    pub stop_reason: LoopStopReason,
    /// Backend calls made.
    pub iterations: u32,
    pub tool_calls: Vec<ToolCallRecord>,
    /// At least one audit append failed during the run.
    pub audit_degraded: bool,
}

impl LoopOutcome {
    pub fn is_completed(&self) -> bool {
        self.stop_reason == LoopStopReason::Completed
    }
}
