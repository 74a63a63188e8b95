pub mod gate;
pub mod prompt;
pub mod session;
pub mod tool_loop;
pub mod types;

pub use gate::Assessment;
pub use prompt::system_prompt;
pub use session::SessionState;
pub use tool_loop::ToolLoop;
pub use types::{LoopOutcome, LoopStopReason, ToolCallRecord};
