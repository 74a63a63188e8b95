use super::common::{io_failure, path_property};
use super::traits::{ExecutionContext, Tool, opt_u64_arg, str_arg};
use super::types::{ToolAccess, ToolFailure, ToolResult};
use crate::security::Clearance;
use serde_json::json;
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;

/// Read a text file, numbering lines the way `cat -n` does.
pub struct FileReadTool;

impl FileReadTool {
    pub const fn new() -> Self {
        Self
    }
}

fn numbered_lines(content: &str, offset: usize, limit: Option<usize>) -> String {
    let start = offset.saturating_sub(1);
    let take = limit.unwrap_or(usize::MAX);
    let mut out = String::new();
    for (idx, line) in content.lines().enumerate().skip(start).take(take) {
        let _ = writeln!(out, "{:6}\t{line}", idx + 1);
    }
    out
}

impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file. Lines are numbered starting at 1; use offset and limit for large files"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": path_property("Path to the file, absolute or relative to the working directory"),
                "offset": {
                    "type": "integer",
                    "description": "1-based line number to start reading from",
                    "minimum": 1
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return",
                    "minimum": 1
                }
            },
            "required": ["file_path"]
        })
    }

    fn access(&self, args: &serde_json::Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolAccess> {
        let path = str_arg(args, "file_path")?;
        opt_u64_arg(args, "offset")?;
        opt_u64_arg(args, "limit")?;
        Ok(ToolAccess::Read {
            path: path.to_string(),
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
            let offset = usize::try_from(opt_u64_arg(&args, "offset")?.unwrap_or(1))?;
            let limit = opt_u64_arg(&args, "limit")?
                .map(usize::try_from)
                .transpose()?;

            match tokio::fs::metadata(&path).await {
                Ok(meta) if !meta.is_file() => {
                    return Ok(ToolResult::failed(
                        ToolFailure::ExecutionFailure,
                        format!("Path is not a file: {}", path.display()),
                    ));
                }
                Ok(_) => {}
                Err(e) => return Ok(io_failure(&path, &e)),
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => return Ok(io_failure(&path, &e)),
            };
            let content = String::from_utf8_lossy(&bytes);
            let output = numbered_lines(&content, offset, limit);

            Ok(ToolResult::ok(output).bounded(ctx.sandbox.limits().max_output_bytes))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::traits::test_support::{clearance, context_in};

    #[test]
    fn numbering_honors_offset_and_limit() {
        let text = "a\nb\nc\nd\n";
        assert_eq!(numbered_lines(text, 1, None), "     1\ta\n     2\tb\n     3\tc\n     4\td\n");
        assert_eq!(numbered_lines(text, 2, Some(2)), "     2\tb\n     3\tc\n");
        assert_eq!(numbered_lines(text, 0, Some(1)), "     1\ta\n");
        assert_eq!(numbered_lines(text, 9, None), "");
    }

    #[test]
    fn access_declares_a_read_of_the_argument() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_in(dir.path());
        let access = FileReadTool::new()
            .access(&json!({"file_path": "notes.txt"}), &ctx)
            .unwrap();
        assert_eq!(
            access,
            ToolAccess::Read {
                path: "notes.txt".into()
            }
        );
        assert!(FileReadTool::new().access(&json!({}), &ctx).is_err());
        assert!(
            FileReadTool::new()
                .access(&json!({"file_path": "a", "limit": "ten"}), &ctx)
                .is_err()
        );
    }

    #[tokio::test]
    async fn reads_numbered_slice() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "one\ntwo\nthree\n").unwrap();
        let ctx = context_in(dir.path());

        let result = FileReadTool::new()
            .execute(
                json!({"file_path": "notes.txt", "offset": 2, "limit": 1}),
                &ctx,
                &clearance(),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "     2\ttwo\n");
    }

    #[tokio::test]
    async fn missing_file_and_directory_fail_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_in(dir.path());
        let tool = FileReadTool::new();

        let missing = tool
            .execute(json!({"file_path": "nope.txt"}), &ctx, &clearance())
            .await
            .unwrap();
        assert!(!missing.success);
        assert!(missing.error.unwrap().starts_with("File not found"));

        let is_dir = tool
            .execute(json!({"file_path": "."}), &ctx, &clearance())
            .await
            .unwrap();
        assert!(!is_dir.success);
        assert!(is_dir.error.unwrap().starts_with("Path is not a file"));
    }
}
