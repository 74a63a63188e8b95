use serde_json::json;
use toolwarden::LoopStopReason;
use toolwarden::security::PermissionResponse;
use toolwarden::tools::ToolFailure;

use crate::warden_harness::{Warden, answer, call, read};

#[tokio::test]
async fn writes_into_system_directories_are_blocked_and_never_reach_disk() {
    let warden = Warden::new(
        vec![
            call(
                "w1",
                "write_file",
                json!({"file_path": "/etc/passwd", "content": "root::0:0::/:/bin/sh"}),
            ),
            answer("gave up"),
        ],
        vec![PermissionResponse::ApproveAlways],
    );
    let before = read(std::path::Path::new("/etc/passwd"));
    let outcome = warden.tool_loop().run("edit passwd").await;

    let record = &outcome.tool_calls[0];
    assert_eq!(record.verdict, "blocked");
    assert_eq!(record.result.failure, Some(ToolFailure::BlockedByPolicy));
    assert!(warden.prompt.asked().is_empty());
    assert_eq!(read(std::path::Path::new("/etc/passwd")), before);

    let log = warden.audit_log();
    assert!(log.contains("path:write_file"));
    assert!(log.contains("| blocked |"));
    assert!(!log.contains("| executed |"));
    assert_eq!(outcome.stop_reason, LoopStopReason::Completed);
}

#[tokio::test]
async fn traversal_out_of_the_working_directory_is_still_checked() {
    let warden = Warden::new(
        vec![
            call(
                "r1",
                "read_file",
                json!({"file_path": "../../../../../../../../etc/shadow"}),
            ),
            answer("done"),
        ],
        vec![],
    );
    let outcome = warden.tool_loop().run("look around").await;

    assert_eq!(
        outcome.tool_calls[0].result.failure,
        Some(ToolFailure::BlockedByPolicy)
    );
}

#[tokio::test]
async fn credential_files_need_confirmation_even_when_new() {
    let warden = Warden::new(
        vec![
            call(
                "w1",
                "write_file",
                json!({"file_path": ".env", "content": "TOKEN=abc"}),
            ),
            answer("done"),
        ],
        vec![PermissionResponse::DenyAlways],
    );
    let outcome = warden.tool_loop().run("store token").await;

    assert_eq!(outcome.tool_calls[0].verdict, "requires_confirmation");
    assert_eq!(
        outcome.tool_calls[0].result.failure,
        Some(ToolFailure::DeniedByUser)
    );
    assert!(!warden.path(".env").exists());
    assert_eq!(warden.prompt.asked().len(), 1);
}

#[tokio::test]
async fn read_edit_cycle_changes_only_the_matched_text() {
    let warden = Warden::new(
        vec![
            call("r1", "read_file", json!({"file_path": "lib.rs"})),
            call(
                "e1",
                "edit_file",
                json!({
                    "file_path": "lib.rs",
                    "old_string": "fn old()",
                    "new_string": "fn renamed()"
                }),
            ),
            answer("renamed"),
        ],
        vec![PermissionResponse::ApproveOnce],
    );
    std::fs::write(warden.path("lib.rs"), "fn old() {}\nfn keep() {}\n").unwrap();
    let outcome = warden.tool_loop().run("rename old").await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.final_text, "renamed");
    assert_eq!(
        read(&warden.path("lib.rs")),
        "fn renamed() {}\nfn keep() {}\n"
    );
    assert!(outcome.tool_calls[0].result.output.contains("fn keep()"));
    let log = warden.audit_log();
    assert!(log.contains("| edit_file | executed | call_id=e1 resolution=approved_once success=true"));
}
