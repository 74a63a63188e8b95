use super::common::path_property;
use super::traits::{ExecutionContext, Tool, opt_str_arg, str_arg};
use super::types::{ToolAccess, ToolFailure, ToolResult};
use crate::security::{Clearance, PathIntent, PathValidator};
use anyhow::bail;
use serde_json::json;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

/// Find files by glob pattern under a directory, newest first.
pub struct GlobTool;

impl GlobTool {
    pub const fn new() -> Self {
        Self
    }
}

/// Patterns are always relative to the searched directory so the gated
/// root bounds every match.
fn validate_pattern(pattern: &str) -> anyhow::Result<()> {
    if pattern.trim().is_empty() {
        bail!("'pattern' must not be empty");
    }
    let as_path = Path::new(pattern);
    if as_path.is_absolute() || pattern.starts_with('~') {
        bail!("'pattern' must be relative to 'path'");
    }
    if as_path.components().any(|c| matches!(c, Component::ParentDir)) {
        bail!("'pattern' must not contain '..'");
    }
    glob::Pattern::new(pattern).map_err(|e| anyhow::anyhow!("invalid glob pattern: {e}"))?;
    Ok(())
}

/// Matches reached through a symlinked directory are re-checked, so a link
/// into a protected prefix never leaks its listing.
fn collect_matches(
    root: &Path,
    pattern: &str,
    paths: &PathValidator,
) -> anyhow::Result<Vec<PathBuf>> {
    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let full = Path::new(&escaped_root).join(pattern);
    let mut found: Vec<(SystemTime, PathBuf)> = glob::glob(&full.to_string_lossy())?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .filter(|path| {
            paths
                .classify(&path.to_string_lossy(), PathIntent::Read)
                .is_allowed()
        })
        .map(|path| {
            let modified = path
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();
    found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern such as '**/*.rs'. Results are sorted by modification time, newest first"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern relative to the search directory"
                },
                "path": path_property("Directory to search in (default: working directory)")
            },
            "required": ["pattern"]
        })
    }

    fn access(&self, args: &serde_json::Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolAccess> {
        validate_pattern(str_arg(args, "pattern")?)?;
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
            let pattern = str_arg(&args, "pattern")?.to_string();
            let root = ctx.resolve(opt_str_arg(&args, "path")?.unwrap_or("."));
            if !root.is_dir() {
                return Ok(ToolResult::failed(
                    ToolFailure::ExecutionFailure,
                    format!("Directory not found: {}", root.display()),
                ));
            }

            let paths = Arc::clone(&ctx.paths);
            let matches =
                tokio::task::spawn_blocking(move || collect_matches(&root, &pattern, &paths))
                    .await??;
            if matches.is_empty() {
                return Ok(ToolResult::ok("No files matched"));
            }

            let listing = matches
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n");
            Ok(ToolResult::ok(listing).bounded(ctx.sandbox.limits().max_output_bytes))
        })
    }
}
