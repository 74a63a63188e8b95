use super::approval::{ApprovalPrompt, ApprovalRequest};
use super::audit::{AuditLogger, AuditOutcome, AuditRecord};
use super::verdict::RiskLevel;
use crate::error::PermissionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Cache key under which a permission decision is remembered for a session.
///
/// Coarse enough that "always allow write_file" covers every ordinary file,
/// scoped enough that it never covers `bash:git push` or credential files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectKey(String);

impl SubjectKey {
    /// `write_file`, `edit_file`, or `<tool>:sensitive` for credential files.
    pub fn file_tool(tool: &str, sensitive: bool) -> Self {
        if sensitive {
            Self(format!("{tool}:sensitive"))
        } else {
            Self(tool.to_string())
        }
    }

    /// Already-derived command key such as `bash:git push`.
    pub fn command(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four operator answers. No other value is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionResponse {
    ApproveOnce,
    ApproveAlways,
    DenyOnce,
    DenyAlways,
}

impl PermissionResponse {
    pub const ALL: [Self; 4] = [
        Self::ApproveOnce,
        Self::ApproveAlways,
        Self::DenyOnce,
        Self::DenyAlways,
    ];

    pub fn is_approval(self) -> bool {
        matches!(self, Self::ApproveOnce | Self::ApproveAlways)
    }

    pub fn scope(self) -> DecisionScope {
        match self {
            Self::ApproveOnce | Self::DenyOnce => DecisionScope::OneShot,
            Self::ApproveAlways => DecisionScope::SessionAlways,
            Self::DenyAlways => DecisionScope::SessionNever,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApproveOnce => "approve_once",
            Self::ApproveAlways => "approve_always",
            Self::DenyOnce => "deny_once",
            Self::DenyAlways => "deny_always",
        }
    }

    /// Menu label shown by the interactive prompt.
    pub fn label(self) -> &'static str {
        match self {
            Self::ApproveOnce => "Yes, once (y)",
            Self::ApproveAlways => "Always for this session (always)",
            Self::DenyOnce => "No, not this time (n)",
            Self::DenyAlways => "Never for this session (never)",
        }
    }
}

impl FromStr for PermissionResponse {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Ok(Self::ApproveOnce),
            "a" | "always" => Ok(Self::ApproveAlways),
            "n" | "no" => Ok(Self::DenyOnce),
            "never" => Ok(Self::DenyAlways),
            other => Err(PermissionError::InvalidResponse(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionScope {
    OneShot,
    SessionAlways,
    SessionNever,
}

/// One operator answer. Held in memory for the session; never written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub scope: DecisionScope,
    pub subject: SubjectKey,
    pub timestamp: DateTime<Utc>,
}

/// Resolution of a single [`PermissionManager::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionAnswer {
    pub response: PermissionResponse,
    /// Resolved from the session cache without prompting.
    pub cached: bool,
}

impl PermissionAnswer {
    pub fn is_approved(self) -> bool {
        self.response.is_approval()
    }
}

/// Arbitrates operator consent for risky actions.
///
/// Per subject key: `Unknown -> CachedAllow | CachedDeny`, driven by
/// "always"/"never" answers; one-shot answers leave the key Unknown. Every
/// request, including cache hits, is audited.
pub struct PermissionManager {
    cache: HashMap<SubjectKey, PermissionDecision>,
    history: Vec<PermissionDecision>,
    prompt: Arc<dyn ApprovalPrompt>,
    audit: Arc<AuditLogger>,
}

impl PermissionManager {
    pub fn new(prompt: Arc<dyn ApprovalPrompt>, audit: Arc<AuditLogger>) -> Self {
        Self {
            cache: HashMap::new(),
            history: Vec::new(),
            prompt,
            audit,
        }
    }

    pub async fn request(
        &mut self,
        subject: &SubjectKey,
        description: &str,
        risk: RiskLevel,
    ) -> PermissionAnswer {
        let operation = format!("permission:{subject}");

        if let Some(cached) = self.cache.get(subject) {
            let response = match cached.scope {
                DecisionScope::SessionNever => PermissionResponse::DenyAlways,
                DecisionScope::SessionAlways | DecisionScope::OneShot => {
                    PermissionResponse::ApproveAlways
                }
            };
            tracing::debug!(subject = %subject, response = response.as_str(), "permission cache hit");
            self.audit.record(AuditRecord::new(
                operation,
                risk,
                outcome_for(response),
                format!("cached={} {description}", response.as_str()),
            ));
            return PermissionAnswer {
                response,
                cached: true,
            };
        }

        let request = ApprovalRequest {
            subject: subject.clone(),
            description: description.to_string(),
            risk,
        };
        let (response, detail) = match self.prompt.ask(&request).await {
            Ok(response) => (response, format!("response={} {description}", response.as_str())),
            Err(error) => {
                tracing::warn!(%error, subject = %subject, "permission prompt failed; denying once");
                (
                    PermissionResponse::DenyOnce,
                    format!("response=deny_once prompt_error={error} {description}"),
                )
            }
        };

        let decision = PermissionDecision {
            scope: response.scope(),
            subject: subject.clone(),
            timestamp: Utc::now(),
        };
        if decision.scope != DecisionScope::OneShot {
            self.cache.insert(subject.clone(), decision.clone());
        }
        self.history.push(decision);

        tracing::info!(subject = %subject, response = response.as_str(), "permission resolved");
        self.audit
            .record(AuditRecord::new(operation, risk, outcome_for(response), detail));

        PermissionAnswer {
            response,
            cached: false,
        }
    }

    /// Cached session decision for `subject`, if any.
    pub fn cached(&self, subject: &SubjectKey) -> Option<&PermissionDecision> {
        self.cache.get(subject)
    }

    /// Every answer given by the operator this session, in order.
    pub fn history(&self) -> &[PermissionDecision] {
        &self.history
    }
}

fn outcome_for(response: PermissionResponse) -> AuditOutcome {
    if response.is_approval() {
        AuditOutcome::Approved
    } else {
        AuditOutcome::Denied
    }
}
