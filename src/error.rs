use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `toolwarden`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; application code continues to use
/// `anyhow::Result` for ad-hoc context chains.
///
/// None of these are tool failures: a blocked, denied or failed tool call is a
/// [`crate::tools::ToolFailure`] fed back to the reasoning backend, not an
/// error that unwinds the loop.
#[derive(Debug, Error)]
pub enum WardenError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Audit trail ─────────────────────────────────────────────────────
    #[error("audit: {0}")]
    Audit(#[from] AuditError),

    // ── Sandboxed execution ─────────────────────────────────────────────
    #[error("sandbox: {0}")]
    Sandbox(#[from] SandboxError),

    // ── Permission prompt ───────────────────────────────────────────────
    #[error("permission: {0}")]
    Permission(#[from] PermissionError),

    // ── Reasoning backend ───────────────────────────────────────────────
    #[error("backend: {0}")]
    Backend(#[from] BackendError),

    // ── Tool registry ───────────────────────────────────────────────────
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Audit errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to open audit log {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append audit record to {path}: {source}")]
    Append {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ─── Sandbox errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("unparseable command line: {0}")]
    Unparseable(String),

    #[error("empty command line")]
    Empty,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for child process: {0}")]
    Wait(#[source] std::io::Error),
}

// ─── Permission errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("invalid permission response: '{0}' (expected y, n, always or never)")]
    InvalidResponse(String),

    #[error("permission prompt failed: {0}")]
    Prompt(String),
}

// ─── Backend errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(String),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend response malformed: {0}")]
    Malformed(String),

    #[error("backend API key is not set (set TOOLWARDEN_API_KEY or edit config.toml)")]
    MissingApiKey,
}

// ─── Registry errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered; tool names must be unique")]
    DuplicateTool(String),
}
