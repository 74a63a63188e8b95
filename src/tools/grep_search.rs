use super::common::path_property;
use super::traits::{ExecutionContext, Tool, opt_bool_arg, opt_str_arg, str_arg};
use super::types::{ToolAccess, ToolFailure, ToolResult};
use crate::security::Clearance;
use regex::{Regex, RegexBuilder};
use serde_json::json;
use std::fmt::Write as _;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Bytes inspected for a NUL when deciding a file is binary.
const BINARY_SNIFF_BYTES: usize = 8192;
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    FilesWithMatches,
    Content,
    Count,
}

impl OutputMode {
    fn parse(raw: Option<&str>) -> anyhow::Result<Self> {
        match raw.unwrap_or("files_with_matches") {
            "files_with_matches" => Ok(Self::FilesWithMatches),
            "content" => Ok(Self::Content),
            "count" => Ok(Self::Count),
            other => anyhow::bail!(
                "unknown output_mode '{other}' (expected files_with_matches, content or count)"
            ),
        }
    }
}

/// Regex search over file contents.
pub struct GrepTool;

impl GrepTool {
    pub const fn new() -> Self {
        Self
    }
}

fn build_regex(args: &serde_json::Value) -> anyhow::Result<Regex> {
    let pattern = str_arg(args, "pattern")?;
    let insensitive = opt_bool_arg(args, "case_insensitive")?.unwrap_or(false);
    RegexBuilder::new(pattern)
        .case_insensitive(insensitive)
        .build()
        .map_err(|e| anyhow::anyhow!("invalid regex: {e}"))
}

/// Regular files under `root`, depth first, sorted per directory. Symlinked
/// directories are not followed and unreadable entries are skipped.
fn walk_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut children: Vec<_> = entries.filter_map(Result::ok).collect();
        children.sort_by_key(std::fs::DirEntry::file_name);
        for entry in children.into_iter().rev() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() {
                let skipped = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name));
                if !skipped {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

fn read_text(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    if sniff.contains(&0) {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn search(root: &Path, regex: &Regex, mode: OutputMode) -> String {
    let mut out = String::new();
    for file in walk_files(root) {
        let Some(text) = read_text(&file) else {
            continue;
        };
        let shown = file.display();
        match mode {
            OutputMode::FilesWithMatches => {
                if regex.is_match(&text) {
                    let _ = writeln!(out, "{shown}");
                }
            }
            OutputMode::Count => {
                let count = text.lines().filter(|line| regex.is_match(line)).count();
                if count > 0 {
                    let _ = writeln!(out, "{shown}:{count}");
                }
            }
            OutputMode::Content => {
                for (idx, line) in text.lines().enumerate() {
                    if regex.is_match(line) {
                        let _ = writeln!(out, "{shown}:{}:{line}", idx + 1);
                    }
                }
            }
        }
    }
    out
}

impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression. Output modes: files_with_matches (default), content, count"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": path_property("File or directory to search (default: working directory)"),
                "output_mode": {
                    "type": "string",
                    "enum": ["files_with_matches", "content", "count"],
                    "description": "What to report for each match"
                },
                "case_insensitive": {
                    "type": "boolean",
                    "description": "Ignore case when matching"
                }
            },
            "required": ["pattern"]
        })
    }

    fn access(&self, args: &serde_json::Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolAccess> {
        build_regex(args)?;
        OutputMode::parse(opt_str_arg(args, "output_mode")?)?;
        let root = opt_str_arg(args, "path")?.unwrap_or(".");
        Ok(ToolAccess::Read {
            path: root.to_string(),
        })
    }

    fn execute<'a>(
        &'a self,
        args: serde_json::Value,
        ctx: &'a ExecutionContext,
        _clearance: &'a Clearance,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>> {
        Box::pin(async move {
            let regex = build_regex(&args)?;
            let mode = OutputMode::parse(opt_str_arg(&args, "output_mode")?)?;
            let root = ctx.resolve(opt_str_arg(&args, "path")?.unwrap_or("."));
            if !root.exists() {
                return Ok(ToolResult::failed(
                    ToolFailure::ExecutionFailure,
                    format!("Path not found: {}", root.display()),
                ));
            }

            let output = tokio::task::spawn_blocking(move || search(&root, &regex, mode)).await?;
            if output.is_empty() {
                return Ok(ToolResult::ok("No matches found"));
            }
            Ok(ToolResult::ok(output).bounded(ctx.sandbox.limits().max_output_bytes))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::traits::test_support::{clearance, context_in};

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.rs"), "fn main() {}\n// TODO fix\n").unwrap();
        std::fs::write(dir.path().join("src/b.rs"), "todo!()\nTODO again\nTODO more\n").unwrap();
        std::fs::write(dir.path().join("blob.bin"), b"TODO\0binary").unwrap();
        dir
    }

    async fn run(dir: &Path, args: serde_json::Value) -> ToolResult {
        GrepTool::new()
            .execute(args, &context_in(dir), &clearance())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn files_with_matches_is_the_default_and_skips_binaries() {
        let dir = fixture();
        let result = run(dir.path(), json!({"pattern": "TODO"})).await;
        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("src/a.rs"));
        assert!(lines[1].ends_with("src/b.rs"));
    }

    #[tokio::test]
    async fn content_mode_reports_line_numbers() {
        let dir = fixture();
        let result = run(
            dir.path(),
            json!({"pattern": "TODO", "output_mode": "content", "path": "src/a.rs"}),
        )
        .await;
        assert!(result.output.trim_end().ends_with("a.rs:2:// TODO fix"));
    }

    #[tokio::test]
    async fn count_mode_honors_case_insensitivity() {
        let dir = fixture();
        let result = run(
            dir.path(),
            json!({"pattern": "todo", "output_mode": "count", "case_insensitive": true, "path": "src"}),
        )
        .await;
        assert!(result.output.contains("a.rs:1"));
        assert!(result.output.contains("b.rs:3"));
    }

    #[tokio::test]
    async fn no_matches_is_a_successful_empty_search() {
        let dir = fixture();
        let result = run(dir.path(), json!({"pattern": "zzz_nothing"})).await;
        assert!(result.success);
        assert_eq!(result.output, "No matches found");
    }

    #[test]
    fn invalid_regex_and_mode_are_argument_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_in(dir.path());
        let tool = GrepTool::new();
        assert!(tool.access(&json!({"pattern": "("}), &ctx).is_err());
        assert!(
            tool.access(&json!({"pattern": "x", "output_mode": "lines"}), &ctx)
                .is_err()
        );
        assert_eq!(
            tool.access(&json!({"pattern": "x", "path": "src"}), &ctx)
                .unwrap(),
            ToolAccess::Read { path: "src".into() }
        );
    }
}
