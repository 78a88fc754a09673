//! Database side of the usage ledger.
//!
//! The balance debit and the usage log insert run in one transaction on a
//! locked user row. If any step fails the transaction is dropped and rolled
//! back, so there is never a debit without its audit row or the reverse.

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use fitplan_db::models::{UsageLog, User};

use super::{GenerationOutcome, LedgerError, authorize, compute_charge};
use crate::config::PipelineConfig;
use crate::error::PipelineError;

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> LedgerError {
    move |source| LedgerError::Database { context, source }
}

async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<User, LedgerError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(db_err("failed to read user"))?
        .ok_or(LedgerError::UserNotFound { user_id })
}

/// Load the user and check they may generate. Call before the model.
pub async fn authorize_user(pool: &PgPool, user_id: Uuid) -> Result<User, PipelineError> {
    let user = fetch_user(pool, user_id).await?;
    authorize(user.tier, user.token_balance)?;
    Ok(user)
}

/// Debit the user's balance and append a usage row for one generation.
///
/// The user row is locked for the duration of the transaction so
/// concurrent charges for the same user serialize. Tier and balance are
/// not checked here: callers run [`authorize_user`] before the model call.
pub async fn record_usage(
    pool: &PgPool,
    user_id: Uuid,
    feature: &str,
    outcome: &GenerationOutcome,
    config: &PipelineConfig,
) -> Result<UsageLog, LedgerError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(db_err("failed to begin transaction"))?;

    // 1. Lock the user row and read the current balance.
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("failed to lock user row"))?
        .ok_or(LedgerError::UserNotFound { user_id })?;

    let charge = compute_charge(user.token_balance, outcome, config);
    let metadata = serde_json::to_value(charge.metadata)?;

    // 2. Debit.
    sqlx::query("UPDATE users SET token_balance = $1 WHERE id = $2")
        .bind(charge.balance_after)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("failed to update token balance"))?;

    // 3. Audit row.
    let log = sqlx::query_as::<_, UsageLog>(
        "INSERT INTO usage_logs (user_id, feature, model, prompt_tokens, completion_tokens, \
         total_tokens, cost, currency, request_id, balance_before, balance_after, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING *",
    )
    .bind(user_id)
    .bind(feature)
    .bind(&charge.model)
    .bind(charge.usage.prompt_tokens)
    .bind(charge.usage.completion_tokens)
    .bind(charge.usage.total_tokens)
    .bind(charge.cost)
    .bind(&charge.currency)
    .bind(&outcome.request_id)
    .bind(charge.balance_before)
    .bind(charge.balance_after)
    .bind(&metadata)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_err("failed to insert usage log"))?;

    tx.commit()
        .await
        .map_err(db_err("failed to commit usage ledger transaction"))?;

    info!(
        user_id = %user_id,
        feature,
        model = %charge.model,
        spent = charge.tokens_spent,
        balance = charge.balance_after,
        "usage recorded"
    );

    Ok(log)
}
