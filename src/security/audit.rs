use super::verdict::RiskLevel;
use crate::error::AuditError;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const AUDIT_DIR_NAME: &str = ".toolwarden";
const AUDIT_FILE_NAME: &str = "audit.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Approved,
    Denied,
    Blocked,
    Executed,
}

impl AuditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Blocked => "blocked",
            Self::Executed => "executed",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One security decision. Append-only: never rewritten once on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub risk: RiskLevel,
    pub outcome: AuditOutcome,
    pub detail: String,
}

impl AuditRecord {
    pub fn new(
        operation: impl Into<String>,
        risk: RiskLevel,
        outcome: AuditOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.into(),
            risk,
            outcome,
            detail: detail.into(),
        }
    }

    /// `timestamp | RISK | operation | outcome | detail`, always a single line.
    pub fn to_line(&self) -> String {
        format!(
            "{} | {} | {} | {} | {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.risk,
            single_line(&self.operation),
            self.outcome,
            single_line(&self.detail),
        )
    }
}

fn single_line(value: &str) -> String {
    value.replace('\r', "\\r").replace('\n', "\\n")
}

/// Append-only audit trail, one file per installation.
///
/// Appends are synchronous and flushed to disk before `record` returns. A
/// failed append never aborts the caller: the first failure in a session is
/// reported as a warning, later ones only bump the failure counter.
#[derive(Debug)]
pub struct AuditLogger {
    path: PathBuf,
    write_lock: Mutex<()>,
    failure_reported: AtomicBool,
    failures: AtomicU64,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            failure_reported: AtomicBool::new(false),
            failures: AtomicU64::new(0),
        }
    }

    /// `~/.toolwarden/audit.log`
    pub fn default_path() -> Result<PathBuf> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        Ok(home.join(AUDIT_DIR_NAME).join(AUDIT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, surfacing the I/O error to the caller.
    pub fn try_record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let display = self.path.display().to_string();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| AuditError::Open {
                path: display.clone(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| AuditError::Open {
                path: display.clone(),
                source,
            })?;

        let mut line = record.to_line();
        line.push('\n');
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(|source| AuditError::Append {
                path: display,
                source,
            })
    }

    /// Append one record. Failures degrade to a once-per-session warning.
    pub fn record(&self, record: AuditRecord) {
        if let Err(error) = self.try_record(&record) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            if self.failure_reported.swap(true, Ordering::SeqCst) {
                tracing::debug!(%error, operation = %record.operation, "audit append failed");
            } else {
                tracing::warn!(
                    %error,
                    path = %self.path.display(),
                    "audit log is not writable; continuing without a complete audit trail"
                );
            }
        }
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn is_degraded(&self) -> bool {
        self.failure_count() > 0
    }
}
