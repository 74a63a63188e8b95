use super::gate;
use super::session::SessionState;
use super::types::{LoopOutcome, LoopStopReason, ToolCallRecord};
use crate::config::{Config, MAX_TOOL_ITERATIONS_CAP};
use crate::error::WardenError;
use crate::providers::{BackendTurn, ConversationMessage, ProposedAction, ReasoningBackend};
use crate::security::{
    ActionVerdict, ApprovalPrompt, AuditLogger, AuditOutcome, AuditRecord, CommandSandbox,
    RateLimitError, RiskLevel,
};
use crate::tools::{ExecutionContext, ToolFailure, ToolRegistry, ToolResult, ToolSpec};
use serde_json::Value;
use std::sync::Arc;

// ── Public types ─────────────────────────────────────────────────────────────

/// Drives one task: asks the backend for the next step, gates and executes
/// each proposed action, feeds observations back, repeats.
///
/// Strictly sequential. At most one action is gated and executed at a time,
/// so the permission cache and the audit trail never race.
pub struct ToolLoop {
    backend: Arc<dyn ReasoningBackend>,
    registry: Arc<ToolRegistry>,
    ctx: ExecutionContext,
    session: SessionState,
    audit: Arc<AuditLogger>,
    max_iterations: u32,
}

// ── Internal types ───────────────────────────────────────────────────────────

/// Accumulated state of a single [`ToolLoop::run`].
struct RunState {
    conversation: Vec<ConversationMessage>,
    tool_calls: Vec<ToolCallRecord>,
    iterations: u32,
    last_text: String,
}

impl RunState {
    fn finish(self, final_text: String, stop_reason: LoopStopReason, audit: &AuditLogger) -> LoopOutcome {
        LoopOutcome {
            final_text,
            stop_reason,
            iterations: self.iterations,
            tool_calls: self.tool_calls,
            audit_degraded: audit.is_degraded(),
        }
    }

    fn stop(self, stop_reason: LoopStopReason, audit: &AuditLogger) -> LoopOutcome {
        let text = self.last_text.clone();
        self.finish(text, stop_reason, audit)
    }
}

// ── Implementation ───────────────────────────────────────────────────────────

impl ToolLoop {
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        registry: Arc<ToolRegistry>,
        ctx: ExecutionContext,
        session: SessionState,
        audit: Arc<AuditLogger>,
        max_iterations: u32,
    ) -> Self {
        Self {
            backend,
            registry,
            ctx,
            session,
            audit,
            max_iterations: max_iterations.min(MAX_TOOL_ITERATIONS_CAP),
        }
    }

    /// Wire a loop from configuration: built-in tools, the configured path
    /// rules and sandbox, a fresh session and the configured audit log.
    /// Validates `config` before building anything.
    pub fn from_config(
        config: &Config,
        backend: Arc<dyn ReasoningBackend>,
        prompt: Arc<dyn ApprovalPrompt>,
    ) -> Result<Self, WardenError> {
        config.validate()?;
        let working_dir = config.working_dir()?;
        let audit = Arc::new(AuditLogger::new(config.audit_log_path()?));
        let registry = Arc::new(ToolRegistry::with_builtin_tools()?);
        let ctx = ExecutionContext::new(
            working_dir.clone(),
            Arc::new(config.path_validator(&working_dir)),
            Arc::new(CommandSandbox::new(
                config.sandbox.rules(),
                config.sandbox.limits(),
                Arc::clone(&audit),
            )),
        );
        let session = SessionState::from_config(&config.rate_limit, prompt, Arc::clone(&audit));
        Ok(Self::new(
            backend,
            registry,
            ctx,
            session,
            audit,
            config.agent.max_tool_iterations,
        ))
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run `task` to completion or to a terminal stop.
    ///
    /// Only the iteration cap, session rate exhaustion and a failing backend
    /// end the run early; every tool-level problem becomes a failed
    /// observation the backend can react to.
    pub async fn run(&mut self, task: &str) -> LoopOutcome {
        let specs: Vec<ToolSpec> = self.registry.specs();
        let mut state = RunState {
            conversation: vec![ConversationMessage::User(task.to_string())],
            tool_calls: Vec::new(),
            iterations: 0,
            last_text: String::new(),
        };

        loop {
            if state.iterations >= self.max_iterations {
                tracing::warn!(
                    iterations = state.iterations,
                    cap = self.max_iterations,
                    "iteration cap reached; stopping"
                );
                return state.stop(LoopStopReason::IterationCapExceeded, &self.audit);
            }

            match self.session.rate.acquire() {
                Ok(wait) if !wait.is_zero() => {
                    tracing::info!(wait_ms = wait.as_millis(), "rate limit reached; waiting");
                    tokio::time::sleep(wait).await;
                }
                Ok(_) => {}
                Err(RateLimitError::SessionExhausted { limit }) => {
                    tracing::warn!(limit, "session call budget exhausted; stopping");
                    return state.stop(LoopStopReason::RateLimitExhausted, &self.audit);
                }
            }

            state.iterations += 1;
            let turn = match self.backend.next_turn(&state.conversation, &specs).await {
                Ok(turn) => turn,
                Err(error) => {
                    tracing::error!(backend = self.backend.name(), %error, "backend call failed");
                    return state.stop(LoopStopReason::Fatal(error.to_string()), &self.audit);
                }
            };

            match turn {
                BackendTurn::Final { text } => {
                    tracing::info!(iterations = state.iterations, "task completed");
                    state.conversation.push(ConversationMessage::Assistant {
                        text: Some(text.clone()),
                        actions: Vec::new(),
                    });
                    return state.finish(text, LoopStopReason::Completed, &self.audit);
                }
                BackendTurn::Actions { text, actions } => {
                    if let Some(text) = &text {
                        state.last_text.clone_from(text);
                    }
                    state.conversation.push(ConversationMessage::Assistant {
                        text,
                        actions: actions.clone(),
                    });
                    for action in actions {
                        let record = self.handle_action(action, state.iterations).await;
                        state.conversation.push(ConversationMessage::ToolResult {
                            call_id: record.call_id.clone(),
                            content: record.result.observation(),
                        });
                        state.tool_calls.push(record);
                    }
                }
            }
        }
    }

    /// Gate and, when cleared, execute one proposed action.
    async fn handle_action(&mut self, action: ProposedAction, iteration: u32) -> ToolCallRecord {
        let ProposedAction {
            call_id,
            tool_name,
            arguments,
        } = action;
        let args = arguments.value();
        let mut record = ToolCallRecord {
            call_id: call_id.clone(),
            tool_name: tool_name.clone(),
            args: args
                .clone()
                .unwrap_or_else(|_| Value::String(arguments.to_wire())),
            verdict: "none".to_string(),
            result: ToolResult::ok(""),
            iteration,
        };

        let (verdict, result) = self.gate_and_execute(&call_id, &tool_name, args).await;
        if let Some(verdict) = verdict {
            record.verdict = verdict.to_string();
        }
        tracing::debug!(
            tool = %tool_name,
            call_id = %call_id,
            success = result.success,
            failure = result.failure.map(ToolFailure::as_str),
            "tool call finished"
        );
        record.result = result.for_call(call_id);
        record
    }

    async fn gate_and_execute(
        &mut self,
        call_id: &str,
        tool_name: &str,
        args: Result<Value, &str>,
    ) -> (Option<&'static str>, ToolResult) {
        let Some(tool) = self.registry.get(tool_name).cloned() else {
            tracing::warn!(tool = tool_name, call_id, "unknown tool requested");
            return (
                None,
                ToolResult::failed(
                    ToolFailure::UnknownTool,
                    format!("unknown tool '{tool_name}'"),
                ),
            );
        };

        let args = match args {
            Ok(args) => args,
            Err(reason) => {
                return (
                    None,
                    ToolResult::failed(ToolFailure::InvalidArguments, reason),
                );
            }
        };

        let access = match tool.access(&args, &self.ctx) {
            Ok(access) => access,
            Err(error) => {
                return (
                    None,
                    ToolResult::failed(
                        ToolFailure::InvalidArguments,
                        format!("invalid arguments for {tool_name}: {error:#}"),
                    ),
                );
            }
        };

        let assessment = gate::assess(tool_name, &access, &self.ctx, &self.audit);
        let label = assessment.verdict.label();
        tracing::info!(tool = tool_name, call_id, verdict = label, "gated tool call");

        let clearance =
            match gate::resolve(call_id, &assessment, &mut self.session.permissions).await {
                Ok(clearance) => clearance,
                Err(refused) => return (Some(label), refused),
            };

        let result = match tool.execute(args, &self.ctx, &clearance).await {
            Ok(result) => result,
            Err(error) => ToolResult::failed(ToolFailure::ExecutionFailure, format!("{error:#}")),
        };

        if access.is_mutating() {
            let risk = match &assessment.verdict {
                ActionVerdict::RequiresConfirmation { risk, .. } => *risk,
                ActionVerdict::Allowed | ActionVerdict::Blocked { .. } => RiskLevel::Low,
            };
            self.audit.record(AuditRecord::new(
                tool_name,
                risk,
                AuditOutcome::Executed,
                format!(
                    "call_id={call_id} resolution={} success={} target={}",
                    clearance.resolution().as_str(),
                    result.success,
                    assessment.description
                ),
            ));
        }

        (Some(label), result)
    }
}
