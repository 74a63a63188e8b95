pub mod approval;
pub mod audit;
pub mod path;
pub mod permissions;
pub mod rate_limit;
pub mod sandbox;
pub mod verdict;

pub use approval::{ApprovalPrompt, ApprovalRequest, AutoDenyPrompt, CliApprovalPrompt, ScriptedPrompt};
pub use audit::{AuditLogger, AuditOutcome, AuditRecord};
pub use path::{PathIntent, PathValidator};
pub use permissions::{
    DecisionScope, PermissionAnswer, PermissionDecision, PermissionManager, PermissionResponse,
    SubjectKey,
};
pub use rate_limit::{RateLimitError, RateLimiter, RateWindow};
pub use sandbox::{CommandRules, CommandSandbox, ExecLimits, RiskyRule, SafeRule};
pub use verdict::{ActionVerdict, Clearance, Resolution, RiskLevel};
