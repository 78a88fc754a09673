//! Database query functions for the `usage_logs` table.
//!
//! Inserts happen only inside the ledger transaction in `fitplan-core`;
//! this module exposes the read side.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::UsageLog;

/// List usage rows for a user, newest first.
pub async fn list_usage_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<UsageLog>> {
    let rows = sqlx::query_as::<_, UsageLog>(
        "SELECT * FROM usage_logs WHERE user_id = $1 ORDER BY created_at DESC, id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list usage logs")?;

    Ok(rows)
}

/// Count usage rows for a user.
pub async fn count_usage_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_logs WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .context("failed to count usage logs")?;

    Ok(count)
}
