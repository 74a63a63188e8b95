use super::common::{io_failure, path_property};
use super::traits::{ExecutionContext, Tool, str_arg};
use super::types::{ToolAccess, ToolFailure, ToolResult};
use crate::security::Clearance;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;

/// Write a whole file, creating parent directories as needed.
pub struct FileWriteTool;

impl FileWriteTool {
    pub const fn new() -> Self {
        Self
    }
}

impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it (and missing parent directories) or replacing it entirely"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": path_property("Path to the file, absolute or relative to the working directory"),
                "content": {
                    "type": "string",
                    "description": "Complete new content of the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    fn access(&self, args: &serde_json::Value, ctx: &ExecutionContext) -> anyhow::Result<ToolAccess> {
        let path = str_arg(args, "file_path")?;
        str_arg(args, "content")?;
        let escalate = ctx
            .resolve(path)
            .is_file()
            .then(|| format!("overwrites existing file {path}"));
        Ok(ToolAccess::Write {
            path: path.to_string(),
            escalate,
        })
    }

    fn execute<'a>(
        &'a self,
        args: serde_json::Value,
        ctx: &'a ExecutionContext,
        _clearance: &'a Clearance,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let path = ctx.resolve(str_arg(&args, "file_path")?);
            let content = str_arg(&args, "content")?;

            let Some(parent) = path.parent() else {
                return Ok(ToolResult::failed(
                    ToolFailure::ExecutionFailure,
                    "Invalid path: missing parent directory",
                ));
            };
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(io_failure(parent, &e));
            }
            if path.is_dir() {
                return Ok(ToolResult::failed(
                    ToolFailure::ExecutionFailure,
                    format!("Path is a directory: {}", path.display()),
                ));
            }

            match tokio::fs::write(&path, content).await {
                Ok(()) => Ok(ToolResult::ok(format!(
                    "Wrote {} bytes to {}",
                    content.len(),
                    path.display()
                ))),
                Err(e) => Ok(io_failure(&path, &e)),
            }
        })
    }
}
