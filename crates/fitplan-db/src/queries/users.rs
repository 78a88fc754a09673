//! Database query functions for the `users` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{PlanTier, User};

/// Insert a new user row and return it.
pub async fn insert_user(
    pool: &PgPool,
    email: &str,
    tier: PlanTier,
    token_balance: i64,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, tier, token_balance) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(email)
    .bind(tier)
    .bind(token_balance)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert user {email:?}"))?;

    Ok(user)
}

/// Fetch a user by ID.
pub async fn get_user(pool: &PgPool, id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user")?;

    Ok(user)
}

/// Overwrite a user's tier.
pub async fn update_user_tier(pool: &PgPool, id: Uuid, tier: PlanTier) -> Result<()> {
    let result = sqlx::query("UPDATE users SET tier = $1 WHERE id = $2")
        .bind(tier)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update user tier")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("user {id} not found");
    }

    Ok(())
}
