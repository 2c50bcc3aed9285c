//! Cross-component scenarios that only make sense against the full
//! Coordinator: symlink creation via bash, and round-tripping a file between
//! the bash and Python engines.

use heimdall_sandbox::{Config, Coordinator};

fn coordinator_in(dir: &std::path::Path) -> Coordinator {
    let config = Config::for_workspace(dir).unwrap();
    Coordinator::new(config)
}

// S4: bash-created symlink escaping the workspace is blocked.
#[tokio::test]
#[ignore = "requires a real bashkit backend"]
async fn s4_bash_symlink_escape_is_blocked() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator_in(dir.path());

    let result = coordinator
        .execute_bash("ln -s /etc/passwd leak && cat leak", None)
        .await
        .unwrap();
    assert_ne!(result.exit_code, 0);
}

// S5 / universal invariant 6: a file bash writes is visible to the Python
// engine afterward, round-tripping through the virtual filesystem sync.
#[tokio::test]
#[ignore = "requires a real bashkit backend"]
async fn s5_bash_write_visible_to_python() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator_in(dir.path());

    coordinator.execute_bash("echo hi > shared.txt", None).await.unwrap();
    let result = coordinator
        .execute_python("print(open('shared.txt').read())", vec![])
        .await;
    assert!(result.success);
    assert!(result.stdout.contains("hi"));
}

// Universal invariant 3: round-trip write then read through the Coordinator.
#[tokio::test]
async fn invariant_write_then_read_via_coordinator() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator_in(dir.path());

    coordinator.write_file("a/b.txt", "round trip").await.unwrap();
    let content = coordinator.read_file("a/b.txt").await.unwrap();
    assert_eq!(content, "round trip");

    let entries = coordinator.list_files(Some("a")).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "b.txt");
    assert!(!entries[0].is_directory);

    coordinator.delete_file("a/b.txt").await.unwrap();
    assert!(coordinator.read_file("a/b.txt").await.is_err());
}
