pub(crate) mod common;
pub mod file_edit;
pub mod file_read;
pub mod file_write;
pub mod glob_search;
pub mod grep_search;
pub mod registry;
pub mod shell;
pub mod traits;
pub mod types;

pub use file_edit::FileEditTool;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use glob_search::GlobTool;
pub use grep_search::GrepTool;
pub use registry::ToolRegistry;
pub use shell::ShellTool;
pub use traits::{ExecutionContext, Tool};
pub use types::{ToolAccess, ToolFailure, ToolResult, ToolSpec};

/// The six built-in tools, in no particular order.
pub fn builtin_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(FileReadTool::new()),
        Box::new(GlobTool::new()),
        Box::new(GrepTool::new()),
        Box::new(FileWriteTool::new()),
        Box::new(FileEditTool::new()),
        Box::new(ShellTool::new()),
    ]
}
