use super::traits::{ExecutionContext, Tool, opt_str_arg, str_arg};
use super::types::{ToolAccess, ToolFailure, ToolResult};
use crate::security::Clearance;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Run a command line through the command sandbox.
///
/// The line is tokenized and executed as a literal argument vector. No shell
/// is involved, so pipes, redirects and substitutions are plain arguments.
pub struct ShellTool;

impl ShellTool {
    pub const fn new() -> Self {
        Self
    }
}

fn timeout_arg(args: &serde_json::Value) -> anyhow::Result<Option<Duration>> {
    match args.get("timeout") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let secs = v
                .as_f64()
                .filter(|s| s.is_finite() && *s >= 0.0)
                .ok_or_else(|| anyhow::anyhow!("'timeout' must be a non-negative number of seconds"))?;
            // Out-of-range values saturate; the sandbox clamps to its ceiling.
            Ok(Some(
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX),
            ))
        }
    }
}

impl Tool for ShellTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a single command (no shell features such as pipes or redirects). Read-only commands run directly; others need operator approval"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command line to run, e.g. 'git status' or 'cargo --version'"
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in seconds (default 30, max 300)"
                },
                "cwd": {
                    "type": "string",
                    "description": "Directory to run in (default: working directory)"
                }
            },
            "required": ["command"]
        })
    }

    fn access(&self, args: &serde_json::Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolAccess> {
        let command = str_arg(args, "command")?;
        timeout_arg(args)?;
        let cwd = opt_str_arg(args, "cwd")?;
        Ok(ToolAccess::Command {
            command: command.to_string(),
            cwd: cwd.map(ToString::to_string),
        })
    }

    fn execute<'a>(
        &'a self,
        args: serde_json::Value,
        ctx: &'a ExecutionContext,
        clearance: &'a Clearance,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let command = str_arg(&args, "command")?;
            let timeout = timeout_arg(&args)?;
            let cwd = opt_str_arg(&args, "cwd")?
                .map_or_else(|| ctx.working_dir().to_path_buf(), |raw| ctx.resolve(raw));

            if !cwd.is_dir() {
                return Ok(ToolResult::failed(
                    ToolFailure::ExecutionFailure,
                    format!("Working directory not found: {}", cwd.display()),
                ));
            }

            Ok(ctx.sandbox.execute(clearance, command, &cwd, timeout).await)
        })
    }
}
