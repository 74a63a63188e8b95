use crate::security::sandbox::TRUNCATION_MARKER;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a tool call did not succeed. Every kind is fed back to the reasoning
/// backend as a failed [`ToolResult`]; none of them stop the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailure {
    /// Destructive command or protected path. Never asked, never retried.
    BlockedByPolicy,
    /// Explicit or cached denial from the operator.
    DeniedByUser,
    /// Nonzero exit, I/O error or any other failure while running.
    ExecutionFailure,
    /// Execution exceeded its timeout and was killed.
    TimedOut,
    UnknownTool,
    InvalidArguments,
}

impl ToolFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BlockedByPolicy => "blocked_by_policy",
            Self::DeniedByUser => "denied_by_user",
            Self::ExecutionFailure => "execution_failure",
            Self::TimedOut => "timed_out",
            Self::UnknownTool => "unknown_tool",
            Self::InvalidArguments => "invalid_arguments",
        }
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Filled in by the loop once the result is bound to a proposed action.
    #[serde(default)]
    pub call_id: String,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ToolFailure>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            error: None,
            truncated: false,
            failure: None,
        }
    }

    pub fn failed(failure: ToolFailure, error: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: false,
            output: String::new(),
            error: Some(error.into()),
            truncated: false,
            failure: Some(failure),
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    #[must_use]
    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// Cap `output` at `limit` bytes on a char boundary, marking the result truncated.
    #[must_use]
    pub fn bounded(mut self, limit: usize) -> Self {
        if self.output.len() > limit {
            self.output.truncate(self.output.floor_char_boundary(limit));
            self.output.push('\n');
            self.output.push_str(TRUNCATION_MARKER);
            self.truncated = true;
        }
        self
    }

    #[must_use]
    pub fn for_call(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }

    /// JSON observation handed back to the reasoning backend.
    pub fn observation(&self) -> String {
        serde_json::json!({
            "success": self.success,
            "output": self.output,
            "error": self.error,
            "truncated": self.truncated,
            "failure": self.failure,
        })
        .to_string()
    }
}

/// Description of a tool for the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// What a proposed call touches, declared by the tool from its arguments.
/// Gating derives every verdict from this; tools never consult permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolAccess {
    Read {
        path: String,
    },
    Write {
        path: String,
        /// Confirmation required even when the path itself is allowed
        /// (overwriting an existing file, editing in place).
        escalate: Option<String>,
    },
    Command {
        command: String,
        cwd: Option<String>,
    },
    None,
}

impl ToolAccess {
    /// Whether executing this access mutates the machine and must leave an
    /// `executed` audit record.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::Command { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_result_carries_kind_and_message() {
        let result = ToolResult::failed(ToolFailure::DeniedByUser, "denied by user");
        assert!(!result.success);
        assert_eq!(result.failure, Some(ToolFailure::DeniedByUser));
        assert_eq!(result.error.as_deref(), Some("denied by user"));
    }

    #[test]
    fn observation_is_json_with_failure_kind() {
        let result = ToolResult::failed(ToolFailure::TimedOut, "timed out").for_call("call_1");
        let parsed: serde_json::Value =
            serde_json::from_str(&result.observation()).expect("valid json");
        assert_eq!(parsed["success"], json!(false));
        assert_eq!(parsed["failure"], json!("timed_out"));
        assert_eq!(result.call_id, "call_1");
    }

    #[test]
    fn bounded_truncates_on_a_char_boundary() {
        let result = ToolResult::ok("héllo wörld").bounded(2);
        assert!(result.truncated);
        assert!(result.output.starts_with('h'));
        assert!(result.output.ends_with(TRUNCATION_MARKER));

        let short = ToolResult::ok("ok").bounded(10);
        assert!(!short.truncated);
        assert_eq!(short.output, "ok");
    }

    #[test]
    fn tool_result_serde_defaults_optional_fields() {
        let parsed: ToolResult = serde_json::from_value(json!({
            "success": true,
            "output": "ok",
            "error": null
        }))
        .expect("deserialize");
        assert!(!parsed.truncated);
        assert!(parsed.failure.is_none());
        assert!(parsed.call_id.is_empty());
    }

    #[test]
    fn only_writes_and_commands_are_mutating() {
        assert!(
            ToolAccess::Write {
                path: "a".into(),
                escalate: None
            }
            .is_mutating()
        );
        assert!(
            ToolAccess::Command {
                command: "ls".into(),
                cwd: None
            }
            .is_mutating()
        );
        assert!(!ToolAccess::Read { path: "a".into() }.is_mutating());
        assert!(!ToolAccess::None.is_mutating());
    }
}
