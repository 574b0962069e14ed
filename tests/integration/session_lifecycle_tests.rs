//! End-to-end session lifecycle: launch gates, process binding, billing.

use std::sync::Arc;

use chrono::{Duration, Utc};

use toolbench::config::ProcessConfig;
use toolbench::models::session::{Session, SessionStatus};
use toolbench::models::tool::Tool;
use toolbench::models::user::User;
use toolbench::orchestrator::Orchestrator;
use toolbench::persistence::db;
use toolbench::supervisor::{ProcessStatus, ProcessSupervisor};
use toolbench::AppError;

struct Bench {
    orchestrator: Arc<Orchestrator>,
    admin_id: String,
    _root: tempfile::TempDir,
}

async fn bench(command: &str, args: &[&str]) -> Bench {
    let pool = Arc::new(db::connect_memory().await.expect("db connect"));
    let config = ProcessConfig {
        command: command.into(),
        args: args.iter().map(|s| (*s).to_owned()).collect(),
        stop_grace_seconds: 2,
        ..ProcessConfig::default()
    };
    let root = tempfile::tempdir().expect("tempdir");
    let supervisor = Arc::new(ProcessSupervisor::new(config, root.path().to_path_buf()));
    let orchestrator = Arc::new(Orchestrator::new(pool, supervisor));

    let admin = User::new("root".into(), true);
    orchestrator
        .users()
        .create(&admin)
        .await
        .expect("create admin");

    Bench {
        orchestrator,
        admin_id: admin.id,
        _root: root,
    }
}

async fn seed_user(bench: &Bench, username: &str, credits: i64) -> String {
    let user = User::new(username.into(), false);
    bench
        .orchestrator
        .users()
        .create(&user)
        .await
        .expect("create user");
    if credits > 0 {
        bench
            .orchestrator
            .grant(&user.id, credits, "signup grant", &bench.admin_id)
            .await
            .expect("grant");
    }
    user.id
}

async fn seed_tool(bench: &Bench, name: &str, rate: i64, requires_process: bool) -> String {
    let tool = Tool::new(name.into(), "test tool".into(), rate, requires_process);
    bench
        .orchestrator
        .tools()
        .create(&tool)
        .await
        .expect("create tool");
    tool.id
}

#[tokio::test]
async fn launch_without_process_creates_active_session() {
    let bench = bench("sleep", &["30"]).await;
    let user_id = seed_user(&bench, "ada", 100).await;
    let tool_id = seed_tool(&bench, "VS Code", 10, false).await;

    let outcome = bench
        .orchestrator
        .launch(&user_id, &tool_id)
        .await
        .expect("launch");

    assert_eq!(outcome.session.status, SessionStatus::Active);
    assert!(outcome.session.process_handle.is_none());
    assert!(outcome.connection.is_none());
    assert_eq!(bench.orchestrator.supervisor().tracked_count().await, 0);

    // Launch itself bills nothing; only the end does.
    let balance = bench
        .orchestrator
        .ledger()
        .balance(&user_id)
        .await
        .expect("balance");
    assert_eq!(balance, 100);
}

#[tokio::test]
async fn launch_binds_a_process_when_the_tool_requires_one() {
    let bench = bench("sleep", &["30"]).await;
    let user_id = seed_user(&bench, "ada", 100).await;
    let tool_id = seed_tool(&bench, "Jupyter", 8, true).await;

    let outcome = bench
        .orchestrator
        .launch(&user_id, &tool_id)
        .await
        .expect("launch");

    let connection = outcome.connection.expect("connection info");
    let handle = outcome
        .session
        .process_handle
        .clone()
        .expect("bound handle");
    assert_eq!(connection.handle, handle);
    assert!(!connection.token.is_empty());

    // Callers poll status until the instance is up.
    assert_eq!(
        bench.orchestrator.process_status(&handle).await,
        ProcessStatus::Running
    );

    // Ending the session releases the process.
    let ended = bench
        .orchestrator
        .end(&outcome.session.id, &user_id)
        .await
        .expect("end");
    assert_eq!(ended.status, SessionStatus::Completed);
    assert_eq!(bench.orchestrator.supervisor().tracked_count().await, 0);
    assert_eq!(
        bench.orchestrator.process_status(&handle).await,
        ProcessStatus::NotFound
    );
}

#[tokio::test]
async fn launch_rejects_missing_user_and_tool() {
    let bench = bench("sleep", &["30"]).await;
    let user_id = seed_user(&bench, "ada", 100).await;
    let tool_id = seed_tool(&bench, "VS Code", 10, false).await;

    let err = bench
        .orchestrator
        .launch("ghost", &tool_id)
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::NotFound(_)));

    let err = bench
        .orchestrator
        .launch(&user_id, "ghost")
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn launch_rejects_inactive_tool() {
    let bench = bench("sleep", &["30"]).await;
    let user_id = seed_user(&bench, "ada", 100).await;
    let tool_id = seed_tool(&bench, "RStudio", 12, false).await;
    bench
        .orchestrator
        .tools()
        .set_active(&tool_id, false)
        .await
        .expect("disable");

    let err = bench
        .orchestrator
        .launch(&user_id, &tool_id)
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::ToolInactive(_)));
}

#[tokio::test]
async fn affordability_gate_leaves_no_trace() {
    let bench = bench("sleep", &["30"]).await;
    // 9 credits cannot cover one hour at 10/h.
    let user_id = seed_user(&bench, "ada", 9).await;
    let tool_id = seed_tool(&bench, "VS Code", 10, false).await;

    let err = bench
        .orchestrator
        .launch(&user_id, &tool_id)
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::InsufficientCredits(_)));

    let balance = bench
        .orchestrator
        .ledger()
        .balance(&user_id)
        .await
        .expect("balance");
    assert_eq!(balance, 9);
    assert_eq!(
        bench
            .orchestrator
            .sessions()
            .count_active()
            .await
            .expect("count"),
        0
    );
    assert!(bench
        .orchestrator
        .sessions()
        .list_for_user(&user_id)
        .await
        .expect("history")
        .is_empty());
}

#[tokio::test]
async fn end_bills_elapsed_time_with_ceiling() {
    let bench = bench("sleep", &["30"]).await;
    let user_id = seed_user(&bench, "ada", 100).await;
    let tool_id = seed_tool(&bench, "VS Code", 10, false).await;

    // A session that has been running for 90 minutes.
    let mut session = Session::new(user_id.clone(), tool_id, None);
    session.start_time = Utc::now() - Duration::minutes(90);
    bench
        .orchestrator
        .sessions()
        .create(&session)
        .await
        .expect("create");

    let ended = bench
        .orchestrator
        .end(&session.id, &user_id)
        .await
        .expect("end");

    assert_eq!(ended.status, SessionStatus::Completed);
    assert_eq!(ended.credits_used, 15);
    assert!(ended.end_time.is_some());

    let balance = bench
        .orchestrator
        .ledger()
        .balance(&user_id)
        .await
        .expect("balance");
    assert_eq!(balance, 85);

    let history = bench
        .orchestrator
        .transactions()
        .list_for_user(&user_id)
        .await
        .expect("history");
    // Signup grant plus exactly one usage debit.
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].amount, -15);
}

#[tokio::test]
async fn usage_debit_may_drive_balance_negative() {
    let bench = bench("sleep", &["30"]).await;
    let user_id = seed_user(&bench, "ada", 10).await;
    let tool_id = seed_tool(&bench, "VS Code", 10, false).await;

    // Affordable at launch time, but five hours elapse before the end.
    let mut session = Session::new(user_id.clone(), tool_id, None);
    session.start_time = Utc::now() - Duration::hours(5);
    bench
        .orchestrator
        .sessions()
        .create(&session)
        .await
        .expect("create");

    let ended = bench
        .orchestrator
        .end(&session.id, &user_id)
        .await
        .expect("end");
    assert_eq!(ended.credits_used, 50);

    let balance = bench
        .orchestrator
        .ledger()
        .balance(&user_id)
        .await
        .expect("balance");
    assert_eq!(balance, -40);
}

#[tokio::test]
async fn immediate_end_bills_zero_and_appends_no_transaction() {
    let bench = bench("sleep", &["30"]).await;
    let user_id = seed_user(&bench, "ada", 100).await;
    let tool_id = seed_tool(&bench, "VS Code", 10, false).await;

    let outcome = bench
        .orchestrator
        .launch(&user_id, &tool_id)
        .await
        .expect("launch");
    let ended = bench
        .orchestrator
        .end(&outcome.session.id, &user_id)
        .await
        .expect("end");

    assert_eq!(ended.credits_used, 0);
    let history = bench
        .orchestrator
        .transactions()
        .list_for_user(&user_id)
        .await
        .expect("history");
    // Only the signup grant; no zero-amount usage entry.
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn only_owner_or_admin_may_end() {
    let bench = bench("sleep", &["30"]).await;
    let owner_id = seed_user(&bench, "ada", 100).await;
    let other_id = seed_user(&bench, "mallory", 100).await;
    let tool_id = seed_tool(&bench, "VS Code", 10, false).await;

    let outcome = bench
        .orchestrator
        .launch(&owner_id, &tool_id)
        .await
        .expect("launch");

    let err = bench
        .orchestrator
        .end(&outcome.session.id, &other_id)
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::Unauthorized(_)));

    let err = bench
        .orchestrator
        .end(&outcome.session.id, "ghost")
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::Unauthorized(_)));

    // Still active after the rejected attempts.
    let session = bench
        .orchestrator
        .sessions()
        .get(&outcome.session.id)
        .await
        .expect("get");
    assert_eq!(session.status, SessionStatus::Active);

    // An admin ending someone else's session terminates it.
    let ended = bench
        .orchestrator
        .end(&outcome.session.id, &bench.admin_id)
        .await
        .expect("admin end");
    assert_eq!(ended.status, SessionStatus::Terminated);
}

#[tokio::test]
async fn end_of_missing_session_is_not_found() {
    let bench = bench("sleep", &["30"]).await;
    let user_id = seed_user(&bench, "ada", 100).await;

    let err = bench
        .orchestrator
        .end("ghost", &user_id)
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn stats_aggregate_users_sessions_and_usage() {
    let bench = bench("sleep", &["30"]).await;
    let user_id = seed_user(&bench, "ada", 100).await;
    let tool_id = seed_tool(&bench, "VS Code", 10, false).await;

    let mut billed = Session::new(user_id.clone(), tool_id.clone(), None);
    billed.start_time = Utc::now() - Duration::minutes(90);
    bench
        .orchestrator
        .sessions()
        .create(&billed)
        .await
        .expect("create");
    bench
        .orchestrator
        .end(&billed.id, &user_id)
        .await
        .expect("end");

    bench
        .orchestrator
        .launch(&user_id, &tool_id)
        .await
        .expect("launch");

    let stats = bench.orchestrator.stats().await.expect("stats");
    // "root" admin plus "ada".
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(stats.total_credits_used, 15);
}
