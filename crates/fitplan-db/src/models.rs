use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Subscription tier of a user. Only `pro` users may spend generation tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Pro,
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Free => "free",
            Self::Pro => "pro",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanTier {
    type Err = PlanTierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            other => Err(PlanTierParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanTier`] string.
#[derive(Debug, Clone)]
pub struct PlanTierParseError(pub String);

impl fmt::Display for PlanTierParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan tier: {:?}", self.0)
    }
}

impl std::error::Error for PlanTierParseError {}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub tier: PlanTier,
    pub token_balance: i64,
    pub created_at: DateTime<Utc>,
}

/// A row from the `usage_logs` table. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UsageLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feature: String,
    pub model: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub cost: f64,
    pub currency: String,
    pub request_id: Option<String>,
    pub balance_before: i64,
    pub balance_after: i64,
    /// Audit flags (`usageMissing`, `pricingMissing`, `overdraw`).
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
