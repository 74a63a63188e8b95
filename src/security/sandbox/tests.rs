use super::*;
use crate::security::verdict::Resolution;
use std::fs;
use tempfile::TempDir;

fn sandbox_in(tmp: &TempDir) -> CommandSandbox {
    CommandSandbox::new(
        CommandRules::default(),
        ExecLimits::default(),
        Arc::new(AuditLogger::new(tmp.path().join("audit.log"))),
    )
}

fn clearance() -> Clearance {
    Clearance::grant("call_test", Resolution::Classified)
}

fn audit_lines(tmp: &TempDir) -> Vec<String> {
    fs::read_to_string(tmp.path().join("audit.log"))
        .unwrap_or_default()
        .lines()
        .map(ToString::to_string)
        .collect()
}

#[test]
fn blocked_classification_is_audited() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = sandbox_in(&tmp);

    assert!(sandbox.classify("rm -rf /", None).is_blocked());
    assert!(sandbox.classify("dd if=/dev/zero of=/dev/sda", None).is_blocked());

    let lines = audit_lines(&tmp);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("| CRITICAL | bash | blocked | command=rm -rf /"));
}

#[test]
fn allowed_and_risky_classifications_are_not_audited_by_the_sandbox() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = sandbox_in(&tmp);

    assert!(sandbox.classify("ls -la", None).is_allowed());
    assert!(!sandbox.classify("git push", None).is_allowed());
    assert!(audit_lines(&tmp).is_empty());
}

#[test]
fn working_directory_decides_whether_a_relative_delete_is_destructive() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = sandbox_in(&tmp);

    assert!(sandbox.classify("rm -rf .", Some(Path::new("/"))).is_blocked());
    assert!(!sandbox.classify("rm -rf .", Some(tmp.path())).is_blocked());
    assert_eq!(audit_lines(&tmp).len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn metacharacters_are_passed_as_literal_arguments() {
    let tmp = TempDir::new().expect("tempdir");
    let victim = tmp.path().join("victim");
    fs::write(&victim, "keep me").expect("seed");
    let sandbox = sandbox_in(&tmp);

    let line = format!("echo hi; rm -rf {}", victim.display());
    let result = sandbox.execute(&clearance(), &line, tmp.path(), None).await;

    assert!(result.success, "{result:?}");
    assert_eq!(
        result.output.trim(),
        format!("hi; rm -rf {}", victim.display())
    );
    assert!(victim.exists(), "second command must never be spawned");
}

#[cfg(unix)]
#[tokio::test]
async fn command_substitution_is_not_expanded() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = sandbox_in(&tmp);
    let result = sandbox
        .execute(&clearance(), "echo $(whoami) `id`", tmp.path(), None)
        .await;
    assert_eq!(result.output.trim(), "$(whoami) `id`");
}

#[cfg(unix)]
#[tokio::test]
async fn timeout_reports_timed_out_failure() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = CommandSandbox::new(
        CommandRules::default(),
        ExecLimits {
            default_timeout: Duration::from_millis(200),
            ..ExecLimits::default()
        },
        Arc::new(AuditLogger::new(tmp.path().join("audit.log"))),
    );

    let result = sandbox
        .execute(&clearance(), "sleep 30", tmp.path(), None)
        .await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(ToolFailure::TimedOut));
    assert!(result.error.as_deref().unwrap_or("").contains("timed out"));
}

#[cfg(unix)]
#[tokio::test]
async fn nonzero_exit_is_an_execution_failure() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = sandbox_in(&tmp);
    let result = sandbox
        .execute(&clearance(), "ls /nonexistent_dir_xyz", tmp.path(), None)
        .await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(ToolFailure::ExecutionFailure));
    assert!(
        result
            .error
            .as_deref()
            .unwrap_or("")
            .contains("exited with status")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn runs_in_the_requested_working_directory() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = sandbox_in(&tmp);
    let result = sandbox.execute(&clearance(), "pwd", tmp.path(), None).await;
    let reported = fs::canonicalize(result.output.trim()).expect("pwd output is a path");
    assert_eq!(reported, fs::canonicalize(tmp.path()).expect("canonical"));
}

/// RAII guard that restores an environment variable on drop.
struct EnvGuard {
    key: &'static str,
    original: Option<String>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        let original = std::env::var(key).ok();
        // SAFETY: test-only mutation, restored on drop.
        unsafe {
            std::env::set_var(key, value);
        }
        Self { key, original }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.original {
            // SAFETY: test-only restoration of a value read by this guard.
            Some(val) => unsafe {
                std::env::set_var(self.key, val);
            },
            // SAFETY: test-only cleanup of a variable introduced by this guard.
            None => unsafe {
                std::env::remove_var(self.key);
            },
        }
    }
}

#[cfg(unix)]
#[tokio::test(flavor = "current_thread")]
async fn secrets_in_the_environment_never_reach_the_child() {
    let _key = EnvGuard::set("TOOLWARDEN_API_KEY", "sk-test-secret-12345");
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = sandbox_in(&tmp);

    let result = sandbox.execute(&clearance(), "env", tmp.path(), None).await;
    assert!(result.success, "{result:?}");
    assert!(!result.output.contains("sk-test-secret-12345"));
}

#[test]
fn subject_keys_are_exposed_through_the_sandbox() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = sandbox_in(&tmp);
    assert_eq!(sandbox.subject_key("git push origin"), "bash:git push");
}
