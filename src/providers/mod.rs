pub mod openai_compat;
pub mod scripted;
pub mod scrub;
pub mod traits;
pub mod types;

pub use openai_compat::OpenAiCompatBackend;
pub use scripted::ScriptedBackend;
pub use scrub::{sanitize_api_error, scrub_secret_patterns};
pub use traits::ReasoningBackend;
pub use types::{ActionArguments, BackendTurn, ConversationMessage, ProposedAction};
