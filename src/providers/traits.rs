use super::types::{BackendTurn, ConversationMessage};
use crate::error::BackendError;
use crate::tools::ToolSpec;
use std::future::Future;
use std::pin::Pin;

/// The reasoning side of the loop: given the conversation so far and the
/// tools on offer, decide what happens next.
///
/// Wire format and retry policy belong to the implementation. The loop
/// treats any error as fatal for the run.
pub trait ReasoningBackend: Send + Sync {
    fn name(&self) -> &str;

    fn next_turn<'a>(
        &'a self,
        conversation: &'a [ConversationMessage],
        tools: &'a [ToolSpec],
    ) -> Pin<Box<dyn Future<Output = Result<BackendTurn, BackendError>> + Send + 'a>>;
}
