use std::time::Duration;

use serde_json::json;
use toolwarden::providers::ConversationMessage;
use toolwarden::security::PermissionResponse;
use toolwarden::tools::ToolFailure;

use crate::warden_harness::{Warden, answer, call};

#[cfg(unix)]
#[tokio::test]
async fn safe_commands_run_without_prompting_and_are_audited() {
    let warden = Warden::new(
        vec![call("b1", "bash", json!({"command": "ls -la"})), answer("listed")],
        vec![],
    );
    std::fs::write(warden.path("visible.txt"), "x").unwrap();
    let outcome = warden.tool_loop().run("list files").await;

    let record = &outcome.tool_calls[0];
    assert_eq!(record.verdict, "allowed");
    assert!(record.result.success, "{:?}", record.result);
    assert!(record.result.output.contains("visible.txt"));
    assert!(warden.prompt.asked().is_empty());
    assert!(warden.audit_log().contains("| bash | executed | call_id=b1 resolution=classified"));
}

#[tokio::test]
async fn denied_push_is_reported_and_the_backend_is_asked_again() {
    let warden = Warden::new(
        vec![
            call("b1", "bash", json!({"command": "git push origin main"})),
            answer("push skipped"),
        ],
        vec![PermissionResponse::DenyOnce],
    );
    let outcome = warden.tool_loop().run("ship it").await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.iterations, 2);
    assert_eq!(
        outcome.tool_calls[0].result.failure,
        Some(ToolFailure::DeniedByUser)
    );

    let second = &warden.backend.conversations()[1];
    let fed_back = second.iter().any(|m| {
        matches!(m, ConversationMessage::ToolResult { call_id, content }
            if call_id == "b1" && content.contains("denied_by_user"))
    });
    assert!(fed_back);
}

#[cfg(unix)]
#[tokio::test]
async fn shell_metacharacters_are_passed_through_literally() {
    let warden = Warden::new(
        vec![
            call("b1", "bash", json!({"command": "echo hi; touch pwned"})),
            call("b2", "bash", json!({"command": "echo $(touch pwned2) > out.txt"})),
            answer("done"),
        ],
        vec![],
    );
    let outcome = warden.tool_loop().run("echo").await;

    assert_eq!(outcome.tool_calls[0].result.output.trim(), "hi; touch pwned");
    assert_eq!(
        outcome.tool_calls[1].result.output.trim(),
        "$(touch pwned2) > out.txt"
    );
    assert!(!warden.path("pwned").exists());
    assert!(!warden.path("pwned2").exists());
    assert!(!warden.path("out.txt").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn runaway_commands_are_killed_at_the_timeout() {
    let warden = Warden::new(
        vec![call("b1", "bash", json!({"command": "sleep 30"})), answer("gave up")],
        vec![PermissionResponse::ApproveOnce],
    )
    .with_default_timeout(Duration::from_millis(300));
    let started = std::time::Instant::now();
    let outcome = warden.tool_loop().run("wait").await;

    assert_eq!(
        outcome.tool_calls[0].result.failure,
        Some(ToolFailure::TimedOut)
    );
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(outcome.is_completed());
}

#[tokio::test]
async fn destructive_commands_are_blocked_before_any_prompt() {
    let warden = Warden::new(
        vec![
            call("b1", "bash", json!({"command": "sudo rm -rf --no-preserve-root /"})),
            call("b2", "bash", json!({"command": "dd if=/dev/zero of=/dev/sda"})),
            answer("refused"),
        ],
        vec![PermissionResponse::ApproveAlways],
    );
    let outcome = warden.tool_loop().run("wipe").await;

    for record in &outcome.tool_calls {
        assert_eq!(record.verdict, "blocked");
        assert_eq!(record.result.failure, Some(ToolFailure::BlockedByPolicy));
    }
    assert!(warden.prompt.asked().is_empty());
    assert!(!warden.audit_log().contains("| executed |"));
}

#[tokio::test]
async fn deleting_the_run_directory_from_the_filesystem_root_is_blocked() {
    let warden = Warden::new(
        vec![
            call("b1", "bash", json!({"command": "rm -rf .", "cwd": "/"})),
            call("b2", "bash", json!({"command": "cp /dev/zero /dev/sda"})),
            answer("refused"),
        ],
        vec![PermissionResponse::ApproveAlways],
    );
    let outcome = warden.tool_loop().run("clean up").await;

    for record in &outcome.tool_calls {
        assert_eq!(record.result.failure, Some(ToolFailure::BlockedByPolicy));
    }
    assert!(warden.prompt.asked().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn out_of_range_timeouts_are_clamped_not_fatal() {
    let warden = Warden::new(
        vec![
            call("b1", "bash", json!({"command": "ls", "timeout": 1e20})),
            answer("listed"),
        ],
        vec![],
    );
    let outcome = warden.tool_loop().run("list").await;

    assert!(outcome.is_completed());
    assert!(outcome.tool_calls[0].result.success, "{:?}", outcome.tool_calls[0].result);
}
