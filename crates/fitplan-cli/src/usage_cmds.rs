//! `fitplan user`, `fitplan charge` and `fitplan usage`: the billing side.

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use fitplan_core::ledger::{self, GenerationOutcome};
use fitplan_core::{PipelineConfig, PipelineError};
use fitplan_db::models::UsageLog;
use fitplan_db::queries::{usage_logs, users};

use crate::UserCommands;
use crate::plan_cmds::report_failure;

fn parse_user_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("invalid user ID: {value}"))
}

/// Run a `fitplan user` subcommand.
pub async fn run_user_command(
    command: UserCommands,
    pool: &PgPool,
    config: &PipelineConfig,
) -> Result<()> {
    match command {
        UserCommands::Add {
            email,
            tier,
            balance,
        } => {
            let user = users::insert_user(pool, &email, tier, balance).await?;
            println!("User {} created ({}, {} tokens).", user.id, user.tier, user.token_balance);
        }
        UserCommands::Show { user_id } => {
            let id = parse_user_id(&user_id)?;
            let user = users::get_user(pool, id)
                .await?
                .with_context(|| format!("user {id} not found"))?;
            println!("User:    {} ({})", user.email, user.id);
            println!("Tier:    {}", user.tier);
            println!("Balance: {}", user.token_balance);
        }
        UserCommands::SetTier { user_id, tier } => {
            let id = parse_user_id(&user_id)?;
            users::update_user_tier(pool, id, tier).await?;
            println!("User {id} is now on the {tier} tier.");
        }
        UserCommands::Check { user_id } => {
            let id = parse_user_id(&user_id)?;
            let user = ledger::authorize_user(pool, id)
                .await
                .map_err(|e| report_failure(e, config))?;
            println!("User {} may generate ({} tokens).", user.id, user.token_balance);
        }
    }
    Ok(())
}

/// Read a generation outcome (`payload`, `model`, `usage`, `requestId`).
fn load_outcome(path: &Path) -> Result<GenerationOutcome> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a generation outcome", path.display()))
}

/// Authorize the user, then debit and log one generation.
async fn charge(
    pool: &PgPool,
    user_id: Uuid,
    feature: &str,
    outcome: &GenerationOutcome,
    config: &PipelineConfig,
) -> Result<UsageLog, PipelineError> {
    ledger::authorize_user(pool, user_id).await?;
    Ok(ledger::record_usage(pool, user_id, feature, outcome, config).await?)
}

/// Run `fitplan charge`: debit and log one generation.
pub async fn run_charge(
    pool: &PgPool,
    user_id: &str,
    feature: &str,
    outcome: &Path,
    config: &PipelineConfig,
) -> Result<()> {
    let id = parse_user_id(user_id)?;
    let outcome = load_outcome(outcome)?;

    let log = charge(pool, id, feature, &outcome, config)
        .await
        .map_err(|e| report_failure(e, config))?;

    println!(
        "Charged {} tokens to {} ({} -> {}), cost {:.4} {}.",
        log.total_tokens.max(0),
        log.user_id,
        log.balance_before,
        log.balance_after,
        log.cost,
        log.currency
    );
    if log.metadata.as_object().is_some_and(|m| !m.is_empty()) {
        println!("Flags: {}", log.metadata);
    }
    Ok(())
}

/// Run `fitplan usage`: list a user's usage rows, newest first.
pub async fn run_usage(pool: &PgPool, user_id: &str) -> Result<()> {
    let id = parse_user_id(user_id)?;
    let rows = usage_logs::list_usage_for_user(pool, id).await?;

    if rows.is_empty() {
        println!("No usage recorded for {id}.");
        return Ok(());
    }

    println!(
        "{:<20} {:<18} {:<16} {:>8} {:>10} {:>10}  FLAGS",
        "WHEN", "FEATURE", "MODEL", "TOKENS", "COST", "BALANCE"
    );
    println!("{}", "-".repeat(92));

    let mut total_tokens: i64 = 0;
    for row in &rows {
        total_tokens += row.total_tokens.max(0);
        let flags = row
            .metadata
            .as_object()
            .map(|m| m.keys().cloned().collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        println!(
            "{:<20} {:<18} {:<16} {:>8} {:>10.4} {:>10}  {}",
            row.created_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(&row.feature, 18),
            truncate(&row.model, 16),
            row.total_tokens,
            row.cost,
            row.balance_after,
            flags
        );
    }
    println!();
    println!("{} generations, {total_tokens} tokens.", rows.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}
