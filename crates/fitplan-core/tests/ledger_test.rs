//! Integration tests for the usage ledger against PostgreSQL.

use fitplan_core::ledger::{
    AuthorizationError, GenerationOutcome, LedgerError, TokenUsage, authorize_user, record_usage,
};
use fitplan_core::{PipelineConfig, PipelineError};
use fitplan_core::config::ModelPricing;
use fitplan_db::models::PlanTier;
use fitplan_db::queries::{usage_logs, users};
use fitplan_test_utils::{create_test_db, drop_test_db, seed_user};
use uuid::Uuid;

fn outcome(total: i64) -> GenerationOutcome {
    GenerationOutcome {
        payload: r#"{"days":[]}"#.into(),
        model: Some("gpt-test".into()),
        usage: Some(TokenUsage {
            prompt_tokens: total / 2,
            completion_tokens: total - total / 2,
            total_tokens: total,
        }),
        request_id: Some("req-1".into()),
    }
}

fn config() -> PipelineConfig {
    PipelineConfig::default().with_pricing(
        "gpt-test",
        ModelPricing {
            prompt_per_1k: 1.0,
            completion_per_1k: 2.0,
        },
    )
}

#[tokio::test]
async fn charge_debits_balance_and_logs_once() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool, "pro@example.com", PlanTier::Pro, 1000).await;

    let log = record_usage(&pool, user.id, "nutrition_plan", &outcome(400), &config())
        .await
        .expect("charge should succeed");
    assert_eq!(log.balance_before, 1000);
    assert_eq!(log.balance_after, 600);
    assert_eq!(log.total_tokens, 400);
    assert_eq!(log.model, "gpt-test");
    assert_eq!(log.request_id.as_deref(), Some("req-1"));
    assert!((log.cost - 0.6).abs() < 1e-9);
    assert_eq!(log.metadata, serde_json::json!({}));

    let reloaded = users::get_user(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(reloaded.token_balance, 600);
    assert_eq!(usage_logs::count_usage_for_user(&pool, user.id).await.unwrap(), 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn overdraw_clamps_and_is_flagged() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool, "low@example.com", PlanTier::Pro, 5).await;

    let log = record_usage(&pool, user.id, "training_plan", &outcome(10), &config())
        .await
        .unwrap();
    assert_eq!(log.balance_after, 0);
    assert_eq!(log.metadata, serde_json::json!({"overdraw": true}));

    let reloaded = users::get_user(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(reloaded.token_balance, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn missing_usage_and_pricing_still_bill() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool, "flags@example.com", PlanTier::Pro, 50).await;

    let bare = GenerationOutcome {
        payload: "{}".into(),
        ..Default::default()
    };
    let log = record_usage(&pool, user.id, "nutrition_plan", &bare, &PipelineConfig::default())
        .await
        .unwrap();
    assert_eq!(log.model, "unknown");
    assert_eq!(log.balance_after, 50);
    assert_eq!(
        log.metadata,
        serde_json::json!({"usageMissing": true, "pricingMissing": true})
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn failed_insert_rolls_back_debit() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool, "rollback@example.com", PlanTier::Pro, 100).await;

    // An empty feature violates the usage_logs check constraint after the
    // balance update has already run inside the transaction.
    let err = record_usage(&pool, user.id, "", &outcome(30), &config())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Database { .. }));

    let reloaded = users::get_user(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(reloaded.token_balance, 100);
    assert_eq!(usage_logs::count_usage_for_user(&pool, user.id).await.unwrap(), 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn unknown_user_writes_nothing() {
    let (pool, db_name) = create_test_db().await;

    let missing = Uuid::new_v4();
    let err = record_usage(&pool, missing, "nutrition_plan", &outcome(1), &config())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::UserNotFound { user_id } if user_id == missing));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn concurrent_charges_serialize_on_the_user_row() {
    let (pool, db_name) = create_test_db().await;
    let user = seed_user(&pool, "busy@example.com", PlanTier::Pro, 1000).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let user_id = user.id;
        handles.push(tokio::spawn(async move {
            record_usage(&pool, user_id, "nutrition_plan", &outcome(50), &config()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("charge should succeed");
    }

    let reloaded = users::get_user(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(reloaded.token_balance, 600);

    let rows = usage_logs::list_usage_for_user(&pool, user.id).await.unwrap();
    assert_eq!(rows.len(), 8);
    // Each row saw the balance the previous one left behind.
    let mut befores: Vec<i64> = rows.iter().map(|r| r.balance_before).collect();
    befores.sort_unstable();
    assert_eq!(befores, [650, 700, 750, 800, 850, 900, 950, 1000]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn authorization_checks_tier_and_balance() {
    let (pool, db_name) = create_test_db().await;
    let free = seed_user(&pool, "free@example.com", PlanTier::Free, 500).await;
    let empty = seed_user(&pool, "empty@example.com", PlanTier::Pro, 0).await;
    let ok = seed_user(&pool, "ok@example.com", PlanTier::Pro, 10).await;

    let err = authorize_user(&pool, free.id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Authorization(AuthorizationError::TierNotAllowed { tier: PlanTier::Free })
    ));
    assert!(!err.is_retryable());

    let err = authorize_user(&pool, empty.id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Authorization(AuthorizationError::InsufficientBalance { balance: 0 })
    ));

    assert_eq!(authorize_user(&pool, ok.id).await.unwrap().id, ok.id);

    pool.close().await;
    drop_test_db(&db_name).await;
}
