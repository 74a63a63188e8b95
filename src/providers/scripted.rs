use super::traits::ReasoningBackend;
use super::types::{BackendTurn, ConversationMessage};
use crate::error::BackendError;
use crate::tools::ToolSpec;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

/// Backend that replays a fixed script of turns and records every
/// conversation it was shown. Drives the loop in tests and dry runs.
pub struct ScriptedBackend {
    turns: Mutex<VecDeque<Result<BackendTurn, BackendError>>>,
    fallback: Option<BackendTurn>,
    seen: Mutex<Vec<Vec<ConversationMessage>>>,
}

impl ScriptedBackend {
    pub fn new(turns: impl IntoIterator<Item = BackendTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().map(Ok).collect()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with `turn`, forever.
    pub fn repeating(turn: BackendTurn) -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            fallback: Some(turn),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failing call after the turns already scripted.
    #[must_use]
    pub fn then_fail(self, error: BackendError) -> Self {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Conversation snapshots, one per call.
    pub fn conversations(&self) -> Vec<Vec<ConversationMessage>> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReasoningBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn next_turn<'a>(
        &'a self,
        conversation: &'a [ConversationMessage],
        _tools: &'a [ToolSpec],
    ) -> Pin<Box<dyn Future<Output = Result<BackendTurn, BackendError>> + Send + 'a>> {
        Box::pin(async move {
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(conversation.to_vec());
            let next = self
                .turns
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match (next, &self.fallback) {
                (Some(turn), _) => turn,
                (None, Some(turn)) => Ok(turn.clone()),
                (None, None) => Err(BackendError::Malformed("backend script exhausted".into())),
            }
        })
    }
}
