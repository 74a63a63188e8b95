pub mod cli;

pub use cli::CliApprovalPrompt;

use super::permissions::{PermissionResponse, SubjectKey};
use super::verdict::RiskLevel;
use crate::error::PermissionError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub subject: SubjectKey,
    pub description: String,
    pub risk: RiskLevel,
}

/// Synchronous request/response with the human operator. Blocks the loop
/// until answered; the only valid answers are the four [`PermissionResponse`]s.
pub trait ApprovalPrompt: Send + Sync {
    fn ask<'a>(
        &'a self,
        request: &'a ApprovalRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PermissionResponse, PermissionError>> + Send + 'a>>;
}

/// Answers from a fixed script, in order. Runs out into a prompt error, which
/// the permission manager treats as deny-once.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<PermissionResponse>>,
    asked: Mutex<Vec<ApprovalRequest>>,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = PermissionResponse>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Every request this prompt has been asked, in order.
    pub fn asked(&self) -> Vec<ApprovalRequest> {
        self.asked
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl ApprovalPrompt for ScriptedPrompt {
    fn ask<'a>(
        &'a self,
        request: &'a ApprovalRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PermissionResponse, PermissionError>> + Send + 'a>>
    {
        Box::pin(async move {
            self.asked
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(request.clone());
            self.answers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front()
                .ok_or_else(|| PermissionError::Prompt("no scripted answer left".to_string()))
        })
    }
}

/// Denies everything without asking. Used when no operator is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDenyPrompt;

impl ApprovalPrompt for AutoDenyPrompt {
    fn ask<'a>(
        &'a self,
        request: &'a ApprovalRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PermissionResponse, PermissionError>> + Send + 'a>>
    {
        Box::pin(async move {
            tracing::info!(subject = %request.subject, "no operator attached; denying");
            Ok(PermissionResponse::DenyOnce)
        })
    }
}
