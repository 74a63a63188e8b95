use crate::error::SandboxError;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Environment variables passed through to spawned commands.
/// Only functional variables are included, never API keys or secrets.
pub const SAFE_ENV_VARS: &[&str] = &[
    "PATH", "HOME", "TERM", "LANG", "LC_ALL", "LC_CTYPE", "USER", "SHELL", "TMPDIR",
];

pub const TRUNCATION_MARKER: &str = "... [output truncated]";

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecLimits {
    pub default_timeout: Duration,
    /// Hard ceiling; requests above it are clamped.
    pub max_timeout: Duration,
    /// Per stream (stdout and stderr are capped separately).
    pub max_output_bytes: usize,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_timeout: Duration::from_secs(300),
            max_output_bytes: 100_000,
        }
    }
}

impl ExecLimits {
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .filter(|d| !d.is_zero())
            .unwrap_or(self.default_timeout)
            .min(self.max_timeout)
    }
}

#[derive(Debug)]
pub enum ExecOutcome {
    Finished {
        status: ExitStatus,
        stdout: CapturedStream,
        stderr: CapturedStream,
    },
    TimedOut {
        after: Duration,
    },
}

#[derive(Debug, Default)]
pub struct CapturedStream {
    pub text: String,
    pub truncated: bool,
}

/// Spawn `argv` directly (no shell) and wait for it, bounded by `timeout`.
///
/// Both pipes are drained concurrently with the wait so a chatty child never
/// blocks on a full pipe; bytes past the ceiling are read and discarded. On
/// timeout the child is killed before returning.
pub async fn run(
    argv: &[String],
    cwd: &Path,
    timeout: Duration,
    max_output_bytes: usize,
) -> Result<ExecOutcome, SandboxError> {
    let (program, args) = argv.split_first().ok_or(SandboxError::Empty)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for var in SAFE_ENV_VARS {
        if let Ok(val) = std::env::var(var) {
            cmd.env(var, val);
        }
    }

    let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
        program: program.clone(),
        source,
    })?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let waited = tokio::time::timeout(timeout, async {
        tokio::join!(
            child.wait(),
            read_capped(stdout, max_output_bytes),
            read_capped(stderr, max_output_bytes),
        )
    })
    .await;

    match waited {
        Ok((status, stdout, stderr)) => Ok(ExecOutcome::Finished {
            status: status.map_err(SandboxError::Wait)?,
            stdout,
            stderr,
        }),
        Err(_) => {
            if let Err(error) = child.kill().await {
                tracing::warn!(%error, program = %program, "failed to kill timed-out command");
            }
            Ok(ExecOutcome::TimedOut { after: timeout })
        }
    }
}

async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> CapturedStream {
    let Some(mut reader) = reader else {
        return CapturedStream::default();
    };

    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }

    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(TRUNCATION_MARKER);
    }
    CapturedStream { text, truncated }
}
