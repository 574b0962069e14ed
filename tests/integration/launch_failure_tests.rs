//! Launch failure paths: a failed spawn must leave no partial state.

use std::sync::Arc;

use toolbench::config::ProcessConfig;
use toolbench::models::tool::Tool;
use toolbench::models::user::User;
use toolbench::orchestrator::Orchestrator;
use toolbench::persistence::db;
use toolbench::supervisor::ProcessSupervisor;
use toolbench::AppError;

async fn bench_with_command(command: &str) -> (Arc<Orchestrator>, tempfile::TempDir) {
    let pool = Arc::new(db::connect_memory().await.expect("db connect"));
    let config = ProcessConfig {
        command: command.into(),
        args: Vec::new(),
        stop_grace_seconds: 2,
        ..ProcessConfig::default()
    };
    let root = tempfile::tempdir().expect("tempdir");
    let supervisor = Arc::new(ProcessSupervisor::new(config, root.path().to_path_buf()));
    (Arc::new(Orchestrator::new(pool, supervisor)), root)
}

#[tokio::test]
async fn failed_spawn_creates_no_session_and_registers_no_process() {
    let (orchestrator, _root) = bench_with_command("toolbench-no-such-binary").await;

    let admin = User::new("root".into(), true);
    orchestrator.users().create(&admin).await.expect("admin");
    let user = User::new("ada".into(), false);
    orchestrator.users().create(&user).await.expect("user");
    orchestrator
        .grant(&user.id, 100, "signup grant", &admin.id)
        .await
        .expect("grant");

    let tool = Tool::new("Jupyter".into(), "Notebook".into(), 8, true);
    orchestrator.tools().create(&tool).await.expect("tool");

    let err = orchestrator
        .launch(&user.id, &tool.id)
        .await
        .expect_err("spawn must fail");
    assert!(matches!(err, AppError::ProcessStart(_)));

    // No session row, no process entry, balance untouched.
    assert!(orchestrator
        .sessions()
        .list_for_user(&user.id)
        .await
        .expect("history")
        .is_empty());
    assert_eq!(orchestrator.supervisor().tracked_count().await, 0);
    assert_eq!(
        orchestrator.ledger().balance(&user.id).await.expect("balance"),
        100
    );
}
