pub mod schema;

pub use schema::{
    AgentConfig, AuditConfig, BackendConfig, Config, MAX_TOOL_ITERATIONS_CAP, PathsConfig,
    RateLimitConfig, SandboxConfig,
};
