#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use toolwarden::SessionState;
use toolwarden::ToolLoop;
use toolwarden::config::PathsConfig;
use toolwarden::providers::{BackendTurn, ProposedAction, ScriptedBackend};
use toolwarden::security::{
    AuditLogger, CommandRules, CommandSandbox, ExecLimits, PathValidator, PermissionManager,
    PermissionResponse, RateLimiter, ScriptedPrompt,
};
use toolwarden::tools::{ExecutionContext, ToolRegistry};

/// A working directory, a separate state directory for the audit log, and
/// scripted stand-ins for the backend and the operator.
pub struct Warden {
    pub work: TempDir,
    state: TempDir,
    pub prompt: Arc<ScriptedPrompt>,
    pub backend: Arc<ScriptedBackend>,
    limits: ExecLimits,
}

impl Warden {
    pub fn new(turns: Vec<BackendTurn>, answers: Vec<PermissionResponse>) -> Self {
        Self {
            work: TempDir::new().unwrap(),
            state: TempDir::new().unwrap(),
            prompt: Arc::new(ScriptedPrompt::new(answers)),
            backend: Arc::new(ScriptedBackend::new(turns)),
            limits: ExecLimits::default(),
        }
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.limits.default_timeout = timeout;
        self
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.work.path().join(relative)
    }

    pub fn audit_path(&self) -> PathBuf {
        self.state.path().join("audit.log")
    }

    pub fn audit_log(&self) -> String {
        std::fs::read_to_string(self.audit_path()).unwrap_or_default()
    }

    pub fn tool_loop(&self) -> ToolLoop {
        let audit = Arc::new(AuditLogger::new(self.audit_path()));
        let paths = PathsConfig::default();
        let ctx = ExecutionContext::new(
            self.work.path(),
            Arc::new(PathValidator::new(
                self.work.path(),
                &paths.protected_prefixes,
                &paths.sensitive_patterns,
            )),
            Arc::new(CommandSandbox::new(
                CommandRules::default(),
                self.limits,
                Arc::clone(&audit),
            )),
        );
        let session = SessionState::new(
            PermissionManager::new(self.prompt.clone(), Arc::clone(&audit)),
            RateLimiter::new(60, 500),
        );
        ToolLoop::new(
            self.backend.clone(),
            Arc::new(ToolRegistry::with_builtin_tools().unwrap()),
            ctx,
            session,
            audit,
            20,
        )
    }
}

pub fn call(call_id: &str, tool: &str, args: Value) -> BackendTurn {
    BackendTurn::Actions {
        text: None,
        actions: vec![ProposedAction::new(call_id, tool, args)],
    }
}

pub fn answer(text: &str) -> BackendTurn {
    BackendTurn::Final { text: text.into() }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}
