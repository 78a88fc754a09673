//! Usage ledger: authorization before a model call and the atomic
//! debit-and-log after it.
//!
//! The charge itself is computed by a pure function so the billing rules
//! can be tested without a database; [`service`] applies it inside a
//! transaction.

pub mod service;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use fitplan_db::models::PlanTier;

use crate::config::PipelineConfig;

pub use service::{authorize_user, record_usage};

/// Model name recorded when the generation result does not report one.
pub const UNKNOWN_MODEL: &str = "unknown";

/// Raised before any model call when the user may not generate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("plan generation requires the pro tier (current tier: {tier})")]
    TierNotAllowed { tier: PlanTier },

    #[error("token balance must be positive (current balance: {balance})")]
    InsufficientBalance { balance: i64 },
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("user {user_id} not found")]
    UserNotFound { user_id: Uuid },

    #[error("{context}")]
    Database {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to encode usage metadata")]
    Metadata(#[from] serde_json::Error),
}

/// Check tier and balance for a user about to generate.
pub fn authorize(tier: PlanTier, balance: i64) -> Result<(), AuthorizationError> {
    if tier != PlanTier::Pro {
        return Err(AuthorizationError::TierNotAllowed { tier });
    }
    if balance <= 0 {
        return Err(AuthorizationError::InsufficientBalance { balance });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Generation outcome
// ---------------------------------------------------------------------------

/// Token counters as reported by the model provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

impl TokenUsage {
    /// Reported total, or prompt + completion when the total is absent.
    /// Negative counters count as zero and the sum saturates.
    pub fn effective_total(&self) -> i64 {
        if self.total_tokens != 0 {
            self.total_tokens.max(0)
        } else {
            self.prompt_tokens
                .max(0)
                .saturating_add(self.completion_tokens.max(0))
        }
    }

    /// Counters as recorded in the ledger: non-negative, with the total filled in.
    pub fn clamped(&self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.max(0),
            completion_tokens: self.completion_tokens.max(0),
            total_tokens: self.effective_total(),
        }
    }
}

/// An already-executed model call. Only `payload` is guaranteed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub payload: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub request_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Charge computation
// ---------------------------------------------------------------------------

/// Audit flags stored with each usage row. Only set flags are serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageMetadata {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub usage_missing: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub pricing_missing: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub overdraw: bool,
}

/// The debit to apply for one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    pub model: String,
    pub usage: TokenUsage,
    pub tokens_spent: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub cost: f64,
    pub currency: String,
    pub metadata: UsageMetadata,
}

/// Compute the debit for a generation against the current balance.
///
/// Spend is the reported total clamped at zero. The resulting balance never
/// goes negative; spending past it sets the `overdraw` flag instead. Missing
/// usage or pricing zero the cost and set their flags.
pub fn compute_charge(balance: i64, outcome: &GenerationOutcome, config: &PipelineConfig) -> Charge {
    let model = outcome
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(UNKNOWN_MODEL)
        .to_string();

    let mut metadata = UsageMetadata::default();
    let usage = match outcome.usage {
        Some(usage) => usage.clamped(),
        None => {
            warn!(model = %model, "generation reported no token usage");
            metadata.usage_missing = true;
            TokenUsage::default()
        }
    };

    let tokens_spent = usage.total_tokens;
    let balance_before = balance.max(0);
    let balance_after = (balance_before - tokens_spent).max(0);
    if tokens_spent > balance_before {
        warn!(
            balance = balance_before,
            spent = tokens_spent,
            "token spend exceeds balance; clamping to zero"
        );
        metadata.overdraw = true;
    }

    let cost = match config.pricing.get(&model) {
        Some(pricing) if !metadata.usage_missing => {
            usage.prompt_tokens as f64 / 1000.0 * pricing.prompt_per_1k
                + usage.completion_tokens as f64 / 1000.0 * pricing.completion_per_1k
        }
        Some(_) => 0.0,
        None => {
            warn!(model = %model, "no pricing configured for model");
            metadata.pricing_missing = true;
            0.0
        }
    };

    Charge {
        model,
        usage,
        tokens_spent,
        balance_before,
        balance_after,
        cost,
        currency: config.currency.clone(),
        metadata,
    }
}
