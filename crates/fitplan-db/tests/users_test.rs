//! Integration tests for user and usage-log queries.
//!
//! Each test creates a unique temporary database through
//! `fitplan-test-utils`, runs migrations, and drops it on completion.

use fitplan_db::models::PlanTier;
use fitplan_db::queries::{usage_logs, users};
use fitplan_test_utils::{create_test_db, drop_test_db};
use uuid::Uuid;

#[tokio::test]
async fn insert_and_fetch_user() {
    let (pool, db_name) = create_test_db().await;

    let inserted = users::insert_user(&pool, "ana@example.com", PlanTier::Pro, 1200)
        .await
        .expect("insert should succeed");
    assert_eq!(inserted.tier, PlanTier::Pro);
    assert_eq!(inserted.token_balance, 1200);

    let fetched = users::get_user(&pool, inserted.id)
        .await
        .expect("fetch should succeed")
        .expect("user should exist");
    assert_eq!(fetched, inserted);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn get_missing_user_returns_none() {
    let (pool, db_name) = create_test_db().await;

    let missing = users::get_user(&pool, Uuid::new_v4()).await.unwrap();
    assert!(missing.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn negative_balance_is_rejected_by_schema() {
    let (pool, db_name) = create_test_db().await;

    let result = users::insert_user(&pool, "neg@example.com", PlanTier::Pro, -1).await;
    assert!(result.is_err(), "token_balance has a CHECK >= 0 constraint");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn update_tier_and_empty_usage() {
    let (pool, db_name) = create_test_db().await;

    let user = users::insert_user(&pool, "free@example.com", PlanTier::Free, 10)
        .await
        .unwrap();
    users::update_user_tier(&pool, user.id, PlanTier::Pro)
        .await
        .unwrap();
    let user = users::get_user(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(user.tier, PlanTier::Pro);

    assert!(
        users::update_user_tier(&pool, Uuid::new_v4(), PlanTier::Pro)
            .await
            .is_err()
    );

    let rows = usage_logs::list_usage_for_user(&pool, user.id).await.unwrap();
    assert!(rows.is_empty());
    assert_eq!(usage_logs::count_usage_for_user(&pool, user.id).await.unwrap(), 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}
