use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::quota::db;
use crate::quota::types::PlanList;
use crate::telemetry::{self};
use crate::telemetry::ops::plan::Phase as PlanPhase;

/// copydesk plan ls/set/show
#[derive(Args)]
pub struct PlanCmd {
    #[command(subcommand)]
    pub cmd: PlanSub,
}

#[derive(Subcommand)]
pub enum PlanSub {
    // list available plans
    Ls,
    // move a user to another plan; resets their counter (plan-only by default)
    Set {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        plan: String,
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
    // show a user's subscription
    Show {
        #[arg(long)]
        user: Uuid,
    },
}

#[derive(Serialize)]
struct PlanChangePlan<'a> {
    action: &'static str,
    user_id: Uuid,
    from: Option<String>,
    to: &'a str,
    max_generations: Option<i32>,
}

pub async fn run(pool: &PgPool, args: PlanCmd) -> Result<()> {
    match args.cmd {
        PlanSub::Ls => ls_plans(pool).await,
        PlanSub::Set { user, plan, apply } => set_plan(pool, user, &plan, apply).await,
        PlanSub::Show { user } => show_subscription(pool, user).await,
    }
}

async fn ls_plans(pool: &PgPool) -> Result<()> {
    let log = telemetry::plan();
    let _g = log.root_span().entered();
    let _s = log.span(&PlanPhase::List).entered();
    let plans = db::list_plans(pool).await.context("list plans")?;
    log.info("💳 Plans:");
    for p in &plans {
        let cap = p.max_generations.map(|m| m.to_string()).unwrap_or_else(|| "unlimited".into());
        log.info(format!("{} generations={} price={:.2}", p.name, cap, p.price));
    }
    if telemetry::config::json_mode() {
        log.result(&PlanList { plans })?;
    }
    Ok(())
}

async fn set_plan(pool: &PgPool, user_id: Uuid, plan_name: &str, apply: bool) -> Result<()> {
    let log = telemetry::plan();
    let _g = log.root_span_kv([
        ("mode", if apply { "apply".to_string() } else { "plan".to_string() }),
        ("user", user_id.to_string()),
        ("plan", plan_name.to_string()),
    ]).entered();

    if !apply {
        let _s = log.span(&PlanPhase::Preview).entered();
        let target = db::find_plan(pool, plan_name).await?;
        let current = match db::get_user_subscription(pool, user_id).await {
            Ok(sub) => Some(sub.plan.name),
            Err(crate::quota::LedgerError::SubscriptionNotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        log.info(format!("📝 Plan change — user={} {:?} -> {} (usage resets to 0)", user_id, current, target.name));
        log.info("   Use --apply to execute.");
        if telemetry::config::json_mode() {
            log.plan(&PlanChangePlan {
                action: "change_plan",
                user_id,
                from: current,
                to: &target.name,
                max_generations: target.max_generations,
            })?;
        }
        return Ok(());
    }

    let _s = log.span(&PlanPhase::Change).entered();
    let sub = db::change_plan(pool, user_id, plan_name)
        .await
        .with_context(|| format!("change plan for {user_id}"))?;
    log.info(format!("✅ {} is now on {}", user_id, sub.plan.name));
    if telemetry::config::json_mode() {
        log.result(&sub)?;
    }
    Ok(())
}

async fn show_subscription(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let log = telemetry::plan();
    let _g = log.root_span_kv([("user", user_id.to_string())]).entered();
    let _s = log.span(&PlanPhase::Show).entered();
    let sub = db::get_user_subscription(pool, user_id).await?;
    let remaining = sub
        .remaining()
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unlimited".into());
    log.info(format!(
        "👤 {} plan={} used={} remaining={} period_started_at={}",
        user_id, sub.plan.name, sub.generations_used, remaining, sub.period_started_at
    ));
    if telemetry::config::json_mode() {
        log.result(&sub)?;
    }
    Ok(())
}
