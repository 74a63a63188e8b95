use crate::config::RateLimitConfig;
use crate::security::{ApprovalPrompt, AuditLogger, PermissionManager, RateLimiter};
use std::sync::Arc;

/// Mutable state of one session: the permission cache and the rate window.
///
/// Owned by exactly one [`crate::agent::ToolLoop`]; two loops built from two
/// `SessionState`s never share decisions or budget.
pub struct SessionState {
    pub permissions: PermissionManager,
    pub rate: RateLimiter,
}

impl SessionState {
    pub fn new(permissions: PermissionManager, rate: RateLimiter) -> Self {
        Self { permissions, rate }
    }

    pub fn from_config(
        rate: &RateLimitConfig,
        prompt: Arc<dyn ApprovalPrompt>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self::new(
            PermissionManager::new(prompt, audit),
            RateLimiter::new(rate.per_minute, rate.per_session),
        )
    }
}
