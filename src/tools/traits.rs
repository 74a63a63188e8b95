use super::types::{ToolAccess, ToolResult, ToolSpec};
use crate::security::{Clearance, CommandSandbox, PathValidator};
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

/// Everything a tool may use while running. Deliberately holds no
/// permission state: tools never decide whether they may run.
#[derive(Clone)]
pub struct ExecutionContext {
    pub working_dir: PathBuf,
    pub paths: Arc<PathValidator>,
    pub sandbox: Arc<CommandSandbox>,
}

impl ExecutionContext {
    pub fn new(
        working_dir: impl Into<PathBuf>,
        paths: Arc<PathValidator>,
        sandbox: Arc<CommandSandbox>,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            paths,
            sandbox,
        }
    }

    /// Absolute, normalized form of a tool path argument, resolved the same
    /// way gating resolved it.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        self.paths.absolutize(raw)
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

/// Core tool trait - implement for any capability
pub trait Tool: Send + Sync {
    /// Tool name (used in LLM function calling)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> Value;

    /// What a call with `args` would touch. Errors mean the arguments are
    /// invalid; nothing is executed.
    fn access(&self, args: &Value, ctx: &ExecutionContext) -> anyhow::Result<ToolAccess>;

    /// Execute the tool. Only reachable with a [`Clearance`] from gating.
    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a ExecutionContext,
        clearance: &'a Clearance,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>>;

    /// Get the full spec for LLM registration
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Required string argument.
pub fn str_arg<'a>(args: &'a Value, name: &str) -> anyhow::Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing '{name}' parameter"))
}

/// Optional string argument; present-but-wrong-type is an error.
pub fn opt_str_arg<'a>(args: &'a Value, name: &str) -> anyhow::Result<Option<&'a str>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("'{name}' must be a string")),
    }
}

/// Optional non-negative integer argument.
pub fn opt_u64_arg(args: &Value, name: &str) -> anyhow::Result<Option<u64>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("'{name}' must be a non-negative integer")),
    }
}

pub fn opt_bool_arg(args: &Value, name: &str) -> anyhow::Result<Option<bool>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("'{name}' must be a boolean")),
    }
}
