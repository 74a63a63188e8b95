use crate::error::ConfigError;
use crate::security::sandbox::{
    CommandRules, ExecLimits, RiskyRule, SafeRule, default_risky_rules, default_safe_rules,
};
use crate::security::{AuditLogger, PathValidator};
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `agent.max_tool_iterations`, whatever the config says.
pub const MAX_TOOL_ITERATIONS_CAP: u32 = 100;

const CONFIG_DIR_NAME: &str = ".toolwarden";

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Diagnostic log filter (`error`, `warn`, `info`, `debug`, `trace`)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            log_level: default_log_level(),
            backend: BackendConfig::default(),
            agent: AgentConfig::default(),
            rate_limit: RateLimitConfig::default(),
            sandbox: SandboxConfig::default(),
            paths: PathsConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

// ── Reasoning backend ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// OpenAI-compatible chat-completions endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Prefer the TOOLWARDEN_API_KEY / XAI_API_KEY environment variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://api.x.ai/v1/chat/completions".into()
}

fn default_model() -> String {
    "grok-code-fast-1".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ── Agent loop ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Working directory for tools (default: the process cwd). `~` is expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Backend round-trips per run before stopping (max 100)
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
}

fn default_max_tool_iterations() -> u32 {
    20
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

// ── Rate limiting ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Backend calls per sliding minute
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
    /// Backend calls per process session
    #[serde(default = "default_per_session")]
    pub per_session: u32,
}

fn default_per_minute() -> u32 {
    60
}

fn default_per_session() -> u32 {
    500
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_session: default_per_session(),
        }
    }
}

// ── Command sandbox ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Ceiling applied to any requested timeout
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,
    /// Captured bytes per output stream
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Commands that run without asking
    #[serde(default = "default_safe_rules")]
    pub safe: Vec<SafeRule>,
    /// Commands that always ask, with the reason shown to the operator
    #[serde(default = "default_risky_rules")]
    pub risky: Vec<RiskyRule>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_timeout_secs() -> u64 {
    300
}

fn default_max_output_bytes() -> usize {
    100_000
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            safe: default_safe_rules(),
            risky: default_risky_rules(),
        }
    }
}

impl SandboxConfig {
    pub fn limits(&self) -> ExecLimits {
        ExecLimits {
            default_timeout: Duration::from_secs(self.default_timeout_secs),
            max_timeout: Duration::from_secs(self.max_timeout_secs),
            max_output_bytes: self.max_output_bytes,
        }
    }

    pub fn rules(&self) -> CommandRules {
        CommandRules::new(&self.safe, &self.risky)
    }
}

// ── Path validation ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory prefixes no tool may read or write
    #[serde(default = "default_protected_prefixes")]
    pub protected_prefixes: Vec<String>,
    /// Substrings marking credential files; writes to them need confirmation
    #[serde(default = "default_sensitive_patterns")]
    pub sensitive_patterns: Vec<String>,
}

fn default_protected_prefixes() -> Vec<String> {
    [
        "/etc", "/usr", "/bin", "/sbin", "/sys", "/proc", "/boot", "/dev", "/lib", "/lib64",
        "/var/lib", "/System", "/Library", "/private/etc", "/private/usr", "/private/var/db",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_sensitive_patterns() -> Vec<String> {
    [
        ".env",
        "credentials.json",
        "credentials.yaml",
        "secrets.yaml",
        "secrets.json",
        "id_rsa",
        "id_dsa",
        "id_ecdsa",
        "id_ed25519",
        ".pem",
        ".key",
        ".ssh/",
        ".aws/credentials",
        ".netrc",
        ".npmrc",
        ".pypirc",
        "token",
        "password",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            protected_prefixes: default_protected_prefixes(),
            sensitive_patterns: default_sensitive_patterns(),
        }
    }
}

// ── Audit trail ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Append-only audit log (default: ~/.toolwarden/audit.log)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
}

// ── Loading ───────────────────────────────────────────────────────

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let config_dir = home.join(CONFIG_DIR_NAME);
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).context("Failed to create .toolwarden directory")?;
        }
        Self::load_or_init_at(&config_dir.join("config.toml"))
    }

    /// Load `config_path`, writing defaults there first if it does not exist.
    pub fn load_or_init_at(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.to_path_buf();
            config
        } else {
            let config = Self {
                config_path: config_path.to_path_buf(),
                ..Self::default()
            };
            config.save()?;
            tracing::info!(path = %config_path.display(), "wrote default config");
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        // API key: TOOLWARDEN_API_KEY, then XAI_API_KEY
        if let Some(key) = non_empty_env("TOOLWARDEN_API_KEY").or_else(|| non_empty_env("XAI_API_KEY"))
        {
            self.backend.api_key = Some(key);
        }
        if let Some(endpoint) = non_empty_env("XAI_CHAT_ENDPOINT") {
            self.backend.endpoint = endpoint;
        }
        if let Some(model) = non_empty_env("XAI_MODEL") {
            self.backend.model = model;
        }
        if let Some(temp) = non_empty_env("XAI_TEMPERATURE").and_then(|t| t.parse().ok()) {
            self.backend.temperature = temp;
        }
        if let Some(dir) = non_empty_env("TOOLWARDEN_WORKING_DIR") {
            self.agent.working_dir = Some(dir);
        }
        if let Some(max) =
            non_empty_env("TOOLWARDEN_MAX_TOOL_ITERATIONS").and_then(|m| m.parse().ok())
        {
            self.agent.max_tool_iterations = max;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::Validation(msg));

        if self.agent.max_tool_iterations == 0 {
            return fail("agent.max_tool_iterations must be at least 1".into());
        }
        if self.agent.max_tool_iterations > MAX_TOOL_ITERATIONS_CAP {
            return fail(format!(
                "agent.max_tool_iterations must not exceed {MAX_TOOL_ITERATIONS_CAP}"
            ));
        }
        if self.rate_limit.per_minute == 0 || self.rate_limit.per_session == 0 {
            return fail("rate_limit.per_minute and rate_limit.per_session must be non-zero".into());
        }
        if self.sandbox.default_timeout_secs == 0 || self.sandbox.max_output_bytes == 0 {
            return fail(
                "sandbox.default_timeout_secs and sandbox.max_output_bytes must be non-zero"
                    .into(),
            );
        }
        if self.sandbox.max_timeout_secs < self.sandbox.default_timeout_secs {
            return fail(format!(
                "sandbox.max_timeout_secs ({}) is below sandbox.default_timeout_secs ({})",
                self.sandbox.max_timeout_secs, self.sandbox.default_timeout_secs
            ));
        }
        if let Some(rule) = self.sandbox.safe.iter().find(|r| r.command.trim().is_empty()) {
            return fail(format!(
                "sandbox.safe contains an empty command (deny_args: {:?})",
                rule.deny_args
            ));
        }
        if self.sandbox.risky.iter().any(|r| r.command.trim().is_empty()) {
            return fail("sandbox.risky contains an empty command".into());
        }
        if !(0.0..=2.0).contains(&self.backend.temperature) {
            return fail(format!(
                "backend.temperature must be between 0.0 and 2.0 (got {})",
                self.backend.temperature
            ));
        }
        Ok(())
    }

    /// Tool working directory: `agent.working_dir` (tilde-expanded) or the process cwd.
    pub fn working_dir(&self) -> Result<PathBuf> {
        let dir = match &self.agent.working_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        if !dir.is_dir() {
            anyhow::bail!("working directory {} does not exist", dir.display());
        }
        dir.canonicalize()
            .with_context(|| format!("Failed to resolve working directory {}", dir.display()))
    }

    pub fn audit_log_path(&self) -> Result<PathBuf> {
        match &self.audit.log_path {
            Some(path) => Ok(PathBuf::from(shellexpand::tilde(path).as_ref())),
            None => AuditLogger::default_path(),
        }
    }

    pub fn path_validator(&self, base_dir: &Path) -> PathValidator {
        PathValidator::new(
            base_dir,
            &self.paths.protected_prefixes,
            &self.paths.sensitive_patterns,
        )
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.agent.max_tool_iterations, 20);
        assert_eq!(c.rate_limit.per_minute, 60);
        assert_eq!(c.rate_limit.per_session, 500);
        assert_eq!(c.sandbox.default_timeout_secs, 30);
        assert_eq!(c.sandbox.max_timeout_secs, 300);
        assert_eq!(c.sandbox.max_output_bytes, 100_000);
        assert_eq!(c.backend.endpoint, "https://api.x.ai/v1/chat/completions");
        assert!(c.paths.protected_prefixes.iter().any(|p| p == "/private/etc"));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn empty_toml_fills_every_section_with_defaults() {
        let c: Config = toml::from_str("").expect("parse");
        assert_eq!(c.log_level, "info");
        assert_eq!(c.sandbox.safe, default_safe_rules());
        assert!(!c.sandbox.risky.is_empty());
    }

    #[test]
    fn rule_tables_are_configurable() {
        let c: Config = toml::from_str(
            r#"
            [[sandbox.safe]]
            command = "make test"

            [[sandbox.safe]]
            command = "find"
            deny_args = ["-delete"]

            [[sandbox.risky]]
            command = "make deploy"
            reason = "ships to production"
            "#,
        )
        .expect("parse");
        assert_eq!(c.sandbox.safe.len(), 2);
        assert_eq!(c.sandbox.safe[1].deny_args, vec!["-delete".to_string()]);
        assert_eq!(c.sandbox.risky[0].reason, "ships to production");

        let rules = c.sandbox.rules();
        assert!(rules.is_safe(&["make".to_string(), "test".to_string()]));
        assert!(!rules.is_safe(&["ls".to_string()]));
    }

    #[test]
    fn validate_rejects_bad_limits() {
        let mut c = Config::default();
        c.rate_limit.per_minute = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.sandbox.max_timeout_secs = 10;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.agent.max_tool_iterations = MAX_TOOL_ITERATIONS_CAP + 1;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.sandbox.safe.push(SafeRule {
            command: "  ".into(),
            deny_args: Vec::new(),
            exact: false,
        });
        assert!(c.validate().is_err());
    }

    #[test]
    fn load_or_init_writes_defaults_then_reads_them_back() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("nested").join("config.toml");

        let first = Config::load_or_init_at(&path).expect("init");
        assert!(path.exists());
        assert_eq!(first.config_path, path);

        let mut edited = first.clone();
        edited.agent.max_tool_iterations = 7;
        edited.save().expect("save");

        let second = Config::load_or_init_at(&path).expect("reload");
        assert_eq!(second.agent.max_tool_iterations, 7);
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("config.toml");
        fs::write(&path, "agent = [not valid").expect("seed");
        assert!(Config::load_or_init_at(&path).is_err());
    }

    #[test]
    fn exec_limits_follow_the_sandbox_section() {
        let c = Config::default();
        let limits = c.sandbox.limits();
        assert_eq!(limits.max_timeout, Duration::from_secs(300));
        assert_eq!(limits.max_output_bytes, 100_000);
    }

    #[test]
    fn working_dir_must_exist() {
        let tmp = TempDir::new().expect("tempdir");
        let mut c = Config::default();
        c.agent.working_dir = Some(tmp.path().display().to_string());
        assert_eq!(
            c.working_dir().expect("dir"),
            tmp.path().canonicalize().expect("canonical")
        );

        c.agent.working_dir = Some(tmp.path().join("missing").display().to_string());
        assert!(c.working_dir().is_err());
    }
}
