//! Command classification and sandboxed execution.
//!
//! Commands never run through a shell: the line is tokenized with POSIX
//! quoting rules and the resulting argument vector is spawned directly, so
//! `;`, `&&`, `|`, backticks and `$()` reach the program as literal bytes.

mod classify;
pub mod exec;
pub mod rules;

pub use exec::{ExecLimits, SAFE_ENV_VARS, TRUNCATION_MARKER};
pub use rules::{CommandRules, RiskyRule, SafeRule, default_risky_rules, default_safe_rules};

use super::audit::{AuditLogger, AuditOutcome, AuditRecord};
use super::verdict::{ActionVerdict, Clearance, RiskLevel};
use crate::tools::{ToolFailure, ToolResult};
use exec::ExecOutcome;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct CommandSandbox {
    rules: CommandRules,
    limits: ExecLimits,
    audit: Arc<AuditLogger>,
}

impl CommandSandbox {
    pub fn new(rules: CommandRules, limits: ExecLimits, audit: Arc<AuditLogger>) -> Self {
        Self {
            rules,
            limits,
            audit,
        }
    }

    pub fn limits(&self) -> &ExecLimits {
        &self.limits
    }

    /// Destructive lines are Blocked (and audited before returning), known
    /// risky lines and anything off the allow-list need confirmation, and only
    /// allow-listed lines are Allowed.
    ///
    /// `cwd` is the directory the command would run in. Relative operands of
    /// destructive patterns are resolved against it; without it they are only
    /// matched literally.
    pub fn classify(&self, command_line: &str, cwd: Option<&Path>) -> ActionVerdict {
        let verdict = classify::classify(&self.rules, command_line, cwd);
        if let ActionVerdict::Blocked { reason } = &verdict {
            tracing::warn!(command = %command_line, %reason, "command blocked");
            self.audit.record(AuditRecord::new(
                "bash",
                RiskLevel::Critical,
                AuditOutcome::Blocked,
                format!("command={command_line} reason={reason}"),
            ));
        }
        verdict
    }

    /// Permission cache key for `command_line`, e.g. `bash:git push`.
    pub fn subject_key(&self, command_line: &str) -> String {
        classify::subject_key(command_line)
    }

    /// Run an allowed command line as a literal argument vector.
    ///
    /// Never fails: spawn errors, nonzero exits and timeouts all come back as
    /// failed [`ToolResult`]s.
    pub async fn execute(
        &self,
        _clearance: &Clearance,
        command_line: &str,
        cwd: &Path,
        timeout: Option<Duration>,
    ) -> ToolResult {
        let Some(argv) = shlex::split(command_line).filter(|a| !a.is_empty()) else {
            return ToolResult::failed(
                ToolFailure::ExecutionFailure,
                format!("unparseable command line: {command_line}"),
            );
        };
        let timeout = self.limits.effective_timeout(timeout);

        tracing::info!(
            command = %command_line,
            cwd = %cwd.display(),
            timeout_secs = timeout.as_secs(),
            "executing command"
        );

        match exec::run(&argv, cwd, timeout, self.limits.max_output_bytes).await {
            Ok(ExecOutcome::Finished {
                status,
                stdout,
                stderr,
            }) => {
                let truncated = stdout.truncated || stderr.truncated;
                if status.success() {
                    let mut result = ToolResult::ok(stdout.text).with_truncated(truncated);
                    if !stderr.text.is_empty() {
                        result.error = Some(stderr.text);
                    }
                    return result;
                }
                let code = status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                tracing::debug!(command = %command_line, exit = %code, "command failed");
                let mut error = format!("command exited with status {code}");
                if !stderr.text.is_empty() {
                    error.push('\n');
                    error.push_str(&stderr.text);
                }
                ToolResult::failed(ToolFailure::ExecutionFailure, error)
                    .with_output(stdout.text)
                    .with_truncated(truncated)
            }
            Ok(ExecOutcome::TimedOut { after }) => {
                tracing::warn!(command = %command_line, timeout_secs = after.as_secs(), "command timed out");
                ToolResult::failed(
                    ToolFailure::TimedOut,
                    format!(
                        "command timed out after {}s and was killed",
                        after.as_secs_f32()
                    ),
                )
            }
            Err(error) => ToolResult::failed(ToolFailure::ExecutionFailure, error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests;
