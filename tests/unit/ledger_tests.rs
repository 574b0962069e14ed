use std::sync::Arc;

use toolbench::ledger::CreditLedger;
use toolbench::models::user::User;
use toolbench::persistence::db;
use toolbench::persistence::transaction_repo::TransactionRepo;
use toolbench::persistence::user_repo::UserRepo;
use toolbench::AppError;

struct Fixture {
    ledger: CreditLedger,
    users: UserRepo,
    transactions: TransactionRepo,
}

async fn fixture() -> Fixture {
    let pool = Arc::new(db::connect_memory().await.expect("db connect"));
    Fixture {
        ledger: CreditLedger::new(Arc::clone(&pool)),
        users: UserRepo::new(Arc::clone(&pool)),
        transactions: TransactionRepo::new(pool),
    }
}

async fn seed_user(fx: &Fixture) -> String {
    let user = User::new("ada".into(), false);
    fx.users.create(&user).await.expect("create user");
    user.id
}

#[tokio::test]
async fn credit_then_debit_updates_cached_balance() {
    let fx = fixture().await;
    let user_id = seed_user(&fx).await;

    let balance = fx
        .ledger
        .credit(&user_id, 100, "signup grant", "admin")
        .await
        .expect("credit");
    assert_eq!(balance, 100);

    let balance = fx
        .ledger
        .debit(&user_id, 30, "manual adjustment", &user_id)
        .await
        .expect("debit");
    assert_eq!(balance, 70);
    assert_eq!(fx.ledger.balance(&user_id).await.expect("balance"), 70);
}

#[tokio::test]
async fn strict_debit_rejects_overdraft() {
    let fx = fixture().await;
    let user_id = seed_user(&fx).await;
    fx.ledger
        .credit(&user_id, 10, "grant", "admin")
        .await
        .expect("credit");

    let err = fx
        .ledger
        .debit(&user_id, 11, "too much", &user_id)
        .await
        .expect_err("must reject");
    assert!(matches!(err, AppError::InsufficientCredits(_)));

    // Balance and log are untouched by the rejected debit.
    assert_eq!(fx.ledger.balance(&user_id).await.expect("balance"), 10);
    assert_eq!(
        fx.transactions
            .list_for_user(&user_id)
            .await
            .expect("history")
            .len(),
        1
    );
}

#[tokio::test]
async fn usage_charge_may_go_negative() {
    let fx = fixture().await;
    let user_id = seed_user(&fx).await;
    fx.ledger
        .credit(&user_id, 5, "grant", "admin")
        .await
        .expect("credit");

    let balance = fx
        .ledger
        .charge_usage(&user_id, 12, "session usage", &user_id)
        .await
        .expect("charge");
    assert_eq!(balance, -7);
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let fx = fixture().await;
    let user_id = seed_user(&fx).await;

    for amount in [0, -5] {
        let err = fx
            .ledger
            .credit(&user_id, amount, "bad", "admin")
            .await
            .expect_err("must reject");
        assert!(matches!(err, AppError::Ledger(_)));

        let err = fx
            .ledger
            .debit(&user_id, amount, "bad", &user_id)
            .await
            .expect_err("must reject");
        assert!(matches!(err, AppError::Ledger(_)));
    }
}

#[tokio::test]
async fn operations_on_missing_user_are_not_found() {
    let fx = fixture().await;

    let err = fx
        .ledger
        .credit("ghost", 10, "grant", "admin")
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::NotFound(_)));

    let err = fx.ledger.balance("ghost").await.expect_err("must fail");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn balance_equals_fold_of_transactions() {
    let fx = fixture().await;
    let user_id = seed_user(&fx).await;

    fx.ledger
        .credit(&user_id, 100, "grant", "admin")
        .await
        .expect("credit");
    fx.ledger
        .charge_usage(&user_id, 37, "usage", &user_id)
        .await
        .expect("charge");
    fx.ledger
        .credit(&user_id, 25, "top-up", "admin")
        .await
        .expect("credit");
    fx.ledger
        .debit(&user_id, 8, "adjustment", &user_id)
        .await
        .expect("debit");

    let cached = fx.ledger.balance(&user_id).await.expect("balance");
    let folded = fx
        .transactions
        .balance_of(&user_id)
        .await
        .expect("fold");
    assert_eq!(cached, 80);
    assert_eq!(cached, folded);
}

#[tokio::test]
async fn concurrent_debits_serialize_per_user() {
    let fx = fixture().await;
    let user_id = seed_user(&fx).await;
    fx.ledger
        .credit(&user_id, 50, "grant", "admin")
        .await
        .expect("credit");

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let ledger = fx.ledger.clone();
        let uid = user_id.clone();
        tasks.push(tokio::spawn(async move {
            ledger.debit(&uid, 1, "unit", &uid).await
        }));
    }
    for task in tasks {
        task.await.expect("join").expect("debit");
    }

    // No debit observed a stale balance: all 50 landed.
    assert_eq!(fx.ledger.balance(&user_id).await.expect("balance"), 0);
    assert_eq!(
        fx.transactions
            .balance_of(&user_id)
            .await
            .expect("fold"),
        0
    );
}
