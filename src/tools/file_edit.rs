use super::common::{io_failure, path_property};
use super::traits::{ExecutionContext, Tool, opt_bool_arg, str_arg};
use super::types::{ToolAccess, ToolFailure, ToolResult};
use crate::security::Clearance;
use anyhow::bail;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;

/// Exact string replacement inside an existing file.
pub struct FileEditTool;

impl FileEditTool {
    pub const fn new() -> Self {
        Self
    }
}

/// Replace `old` with `new` in `text`. Returns the edited text and the
/// number of replacements, or `None` if `old` does not occur.
fn replace_exact(text: &str, old: &str, new: &str, replace_all: bool) -> Option<(String, usize)> {
    let occurrences = text.matches(old).count();
    if occurrences == 0 {
        return None;
    }
    if replace_all {
        Some((text.replace(old, new), occurrences))
    } else {
        Some((text.replacen(old, new, 1), 1))
    }
}

impl Tool for FileEditTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace an exact string in an existing file. Replaces the first occurrence unless replace_all is true"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": path_property("Path to the file, absolute or relative to the working directory"),
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence instead of the first"
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    fn access(&self, args: &serde_json::Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolAccess> {
        let path = str_arg(args, "file_path")?;
        if str_arg(args, "old_string")?.is_empty() {
            bail!("'old_string' must not be empty");
        }
        str_arg(args, "new_string")?;
        opt_bool_arg(args, "replace_all")?;
        Ok(ToolAccess::Write {
            path: path.to_string(),
            escalate: Some(format!("edits {path} in place")),
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
            let old = str_arg(&args, "old_string")?;
            let new = str_arg(&args, "new_string")?;
            let replace_all = opt_bool_arg(&args, "replace_all")?.unwrap_or(false);

            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => return Ok(io_failure(&path, &e)),
            };

            let Some((edited, count)) = replace_exact(&text, old, new, replace_all) else {
                return Ok(ToolResult::failed(
                    ToolFailure::ExecutionFailure,
                    format!("String not found in file: {}", path.display()),
                ));
            };

            if let Err(e) = tokio::fs::write(&path, edited).await {
                return Ok(io_failure(&path, &e));
            }
            let noun = if count == 1 { "occurrence" } else { "occurrences" };
            Ok(ToolResult::ok(format!(
                "Replaced {count} {noun} in {}",
                path.display()
            )))
        })
    }
}
