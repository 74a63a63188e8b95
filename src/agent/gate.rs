//! Gating: turns a tool's declared access into a verdict, resolves
//! confirmations through the permission manager, and hands out the
//! [`Clearance`] execution requires.

use crate::security::{
    ActionVerdict, AuditLogger, AuditOutcome, AuditRecord, Clearance, PathIntent,
    PermissionManager, Resolution, RiskLevel, SubjectKey,
};
use crate::tools::{ExecutionContext, ToolAccess, ToolFailure, ToolResult};

/// Verdict for one declared access, plus the key a confirmation would be
/// cached under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub verdict: ActionVerdict,
    pub subject: SubjectKey,
    pub description: String,
}

fn path_verdict(
    tool: &str,
    raw: &str,
    intent: PathIntent,
    ctx: &ExecutionContext,
    audit: &AuditLogger,
) -> ActionVerdict {
    let verdict = ctx.paths.classify(raw, intent);
    if let ActionVerdict::Blocked { reason } = &verdict {
        tracing::warn!(tool, path = raw, intent = intent.as_str(), %reason, "path blocked");
        audit.record(AuditRecord::new(
            format!("path:{tool}"),
            RiskLevel::Critical,
            AuditOutcome::Blocked,
            format!("path={raw} intent={} reason={reason}", intent.as_str()),
        ));
    }
    verdict
}

/// Classify what `tool` declared it will touch. Blocked paths are audited
/// here; blocked commands are audited by the sandbox.
pub fn assess(
    tool: &str,
    access: &ToolAccess,
    ctx: &ExecutionContext,
    audit: &AuditLogger,
) -> Assessment {
    match access {
        ToolAccess::Read { path } => Assessment {
            verdict: path_verdict(tool, path, PathIntent::Read, ctx, audit),
            subject: SubjectKey::file_tool(tool, false),
            description: format!("{tool} {path}"),
        },
        ToolAccess::Write { path, escalate } => {
            let mut verdict = path_verdict(tool, path, PathIntent::Write, ctx, audit);
            if let Some(reason) = escalate {
                verdict = verdict.stricter(ActionVerdict::confirm(reason.clone(), RiskLevel::Medium));
            }
            let description = match &verdict {
                ActionVerdict::RequiresConfirmation { reason, .. } => {
                    format!("{tool} {path} ({reason})")
                }
                _ => format!("{tool} {path}"),
            };
            Assessment {
                verdict,
                subject: SubjectKey::file_tool(tool, ctx.paths.is_sensitive_path(path)),
                description,
            }
        }
        ToolAccess::Command { command, cwd } => {
            let cwd_raw = cwd
                .clone()
                .unwrap_or_else(|| ctx.working_dir().to_string_lossy().into_owned());
            let cwd_verdict = path_verdict(tool, &cwd_raw, PathIntent::Read, ctx, audit);
            let verdict = if cwd_verdict.is_blocked() {
                cwd_verdict
            } else {
                let run_dir = ctx.resolve(&cwd_raw);
                let run_dir = std::fs::canonicalize(&run_dir).unwrap_or(run_dir);
                cwd_verdict.stricter(ctx.sandbox.classify(command, Some(&run_dir)))
            };
            let description = match &verdict {
                ActionVerdict::RequiresConfirmation { reason, .. } => {
                    format!("run `{command}` in {cwd_raw} ({reason})")
                }
                _ => format!("run `{command}` in {cwd_raw}"),
            };
            Assessment {
                verdict,
                subject: SubjectKey::command(ctx.sandbox.subject_key(command)),
                description,
            }
        }
        ToolAccess::None => Assessment {
            verdict: ActionVerdict::Allowed,
            subject: SubjectKey::file_tool(tool, false),
            description: tool.to_string(),
        },
    }
}

/// Resolve an assessment to a [`Clearance`], or to the failed result the
/// backend sees instead. Blocked never reaches the permission manager.
pub async fn resolve(
    call_id: &str,
    assessment: &Assessment,
    permissions: &mut PermissionManager,
) -> Result<Clearance, ToolResult> {
    match &assessment.verdict {
        ActionVerdict::Allowed => Ok(Clearance::grant(call_id, Resolution::Classified)),
        ActionVerdict::Blocked { reason } => Err(ToolResult::failed(
            ToolFailure::BlockedByPolicy,
            format!("blocked by security policy: {reason}"),
        )),
        ActionVerdict::RequiresConfirmation { reason, risk } => {
            let answer = permissions
                .request(&assessment.subject, &assessment.description, *risk)
                .await;
            match (answer.is_approved(), answer.cached) {
                (true, true) => Ok(Clearance::grant(call_id, Resolution::ApprovedCached)),
                (true, false) => Ok(Clearance::grant(call_id, Resolution::ApprovedOnce)),
                (false, cached) => {
                    let how = if cached { " (remembered for this session)" } else { "" };
                    Err(ToolResult::failed(
                        ToolFailure::DeniedByUser,
                        format!("denied by user{how}: {reason}"),
                    ))
                }
            }
        }
    }
}
