use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::telemetry::{self};
use crate::telemetry::ops::quota::Phase as QuotaPhase;

pub mod db;
pub mod types;

#[cfg(test)]
pub mod memory;

pub use db::PgLedger;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("no subscription for user {0}")]
    SubscriptionNotFound(Uuid),
    #[error("plan not found: {0}")]
    PlanNotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Per-user generation allowance against the subscribed plan's cap.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// `None` means the plan is unlimited.
    async fn remaining(&self, user_id: Uuid) -> Result<Option<u32>, LedgerError>;

    async fn can_generate(&self, user_id: Uuid) -> Result<bool, LedgerError> {
        Ok(self.remaining(user_id).await?.is_none_or(|n| n > 0))
    }

    /// Atomically charge one generation. False when nothing was charged.
    async fn consume(&self, user_id: Uuid) -> bool;
}

/// What the caller is told about the allowance after a generation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QuotaBalance {
    Unlimited,
    Limited(u32),
    Unknown,
}

impl QuotaBalance {
    pub fn from_remaining(remaining: Option<u32>) -> Self {
        match remaining {
            None => QuotaBalance::Unlimited,
            Some(n) => QuotaBalance::Limited(n),
        }
    }
}

impl std::fmt::Display for QuotaBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaBalance::Unlimited => f.write_str("unlimited"),
            QuotaBalance::Limited(n) => write!(f, "{n}"),
            QuotaBalance::Unknown => f.write_str("unknown"),
        }
    }
}

/// Remaining allowance for a cap and a usage counter, floored at zero.
pub fn remaining_for(max_generations: Option<i32>, generations_used: i32) -> Option<u32> {
    max_generations.map(|max| max.saturating_sub(generations_used).max(0) as u32)
}

/// copydesk quota [--user <uuid>] | quota renew [--apply]
#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct QuotaCmd {
    #[command(subcommand)]
    pub cmd: Option<QuotaSub>,
    /// Show remaining generations for this user
    #[arg(long)]
    pub user: Option<Uuid>,
}

#[derive(Subcommand, Debug)]
pub enum QuotaSub {
    // reset counters whose monthly period has elapsed (plan-only by default)
    Renew {
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
}

#[derive(Serialize)]
struct QuotaView {
    user_id: Uuid,
    remaining: QuotaBalance,
    can_generate: bool,
}

#[derive(Serialize)]
struct RenewPlan {
    action: &'static str,
    now: DateTime<Utc>,
    due: Vec<Uuid>,
}

#[derive(Serialize)]
struct RenewResult {
    renewed: Vec<Uuid>,
}

pub async fn run(pool: &PgPool, args: QuotaCmd) -> Result<()> {
    match (args.cmd, args.user) {
        (Some(QuotaSub::Renew { apply }), _) => renew(pool, apply).await,
        (None, Some(user)) => show(pool, user).await,
        (None, None) => bail!("pass --user <uuid> or a subcommand (renew)"),
    }
}

async fn show(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let log = telemetry::quota();
    let _g = log.root_span_kv([("user", user_id.to_string())]).entered();
    let _s = log.span(&QuotaPhase::Lookup).entered();

    let ledger = PgLedger::new(pool.clone());
    let remaining = ledger.remaining(user_id).await?;
    let view = QuotaView {
        user_id,
        remaining: QuotaBalance::from_remaining(remaining),
        can_generate: remaining.is_none_or(|n| n > 0),
    };
    log.info(format!("📊 Quota for {} — remaining={} can_generate={}", user_id, view.remaining, view.can_generate));
    if telemetry::config::json_mode() {
        log.result(&view)?;
    }
    Ok(())
}

async fn renew(pool: &PgPool, apply: bool) -> Result<()> {
    let log = telemetry::quota();
    let now = Utc::now();
    let _g = log.root_span_kv([
        ("mode", if apply { "apply".to_string() } else { "plan".to_string() }),
        ("now", now.to_rfc3339()),
    ]).entered();

    if !apply {
        let _s = log.span(&QuotaPhase::Plan).entered();
        let due = db::expired_periods(pool, now).await?;
        log.info(format!("📝 Renew plan — {} subscription(s) past their monthly period", due.len()));
        log.info("   Use --apply to execute.");
        if telemetry::config::json_mode() {
            log.plan(&RenewPlan { action: "renew", now, due })?;
        }
        return Ok(());
    }

    let _s = log.span(&QuotaPhase::Renew).entered();
    let renewed = db::renew_expired_periods(pool, now).await?;
    log.info(format!("🔄 Renewed {} subscription(s)", renewed.len()));
    if telemetry::config::json_mode() {
        log.result(&RenewResult { renewed })?;
    }
    Ok(())
}
