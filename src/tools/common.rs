use super::types::{ToolFailure, ToolResult};
use serde_json::json;
use std::path::Path;

pub(crate) fn path_property(description: &str) -> serde_json::Value {
    json!({
        "type": "string",
        "description": description
    })
}

/// Failed result for an I/O error on `path`, phrased the way the backend
/// expects to read it back.
pub(crate) fn io_failure(path: &Path, err: &std::io::Error) -> ToolResult {
    let message = match err.kind() {
        std::io::ErrorKind::NotFound => format!("File not found: {}", path.display()),
        std::io::ErrorKind::PermissionDenied => {
            format!("Permission denied: {}", path.display())
        }
        _ => format!("Failed to access {}: {err}", path.display()),
    };
    ToolResult::failed(ToolFailure::ExecutionFailure, message)
}
