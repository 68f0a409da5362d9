use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::migrate::Migrator;

use crate::quota::db::check_connection;
use crate::telemetry::{self};
use crate::telemetry::ops::init::Phase as InitPhase;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// copydesk init [--apply]
#[derive(Args, Debug)]
pub struct InitCmd {
    /// Run pending migrations (plan-only by default)
    #[arg(long, default_value_t = false)]
    apply: bool,
}

#[derive(Serialize)]
struct MigrationEntry {
    version: i64,
    description: String,
    applied: bool,
}

#[derive(Serialize)]
struct InitPlan {
    action: &'static str,
    migrations: Vec<MigrationEntry>,
}

#[derive(Serialize)]
struct InitResult {
    applied: Vec<i64>,
    connection_ok: bool,
}

pub async fn run(pool: &PgPool, args: InitCmd) -> Result<()> {
    let log = telemetry::init();
    let _g = log
        .root_span_kv([("mode", if args.apply { "apply".to_string() } else { "plan".to_string() })])
        .entered();

    let applied = applied_versions(pool).await;
    let migrations: Vec<MigrationEntry> = MIGRATOR
        .iter()
        .map(|m| MigrationEntry {
            version: m.version,
            description: m.description.to_string(),
            applied: applied.contains(&m.version),
        })
        .collect();

    if !args.apply {
        let _s = log.span(&InitPhase::Plan).entered();
        let pending = migrations.iter().filter(|m| !m.applied).count();
        log.info(format!("📝 Init plan — {} migration(s), {} pending", migrations.len(), pending));
        for m in &migrations {
            log.info(format!("   {} {} {}", m.version, m.description, if m.applied { "applied" } else { "pending" }));
        }
        log.info("   Use --apply to execute.");
        if telemetry::config::json_mode() {
            log.plan(&InitPlan { action: "migrate", migrations })?;
        }
        return Ok(());
    }

    {
        let _s = log.span(&InitPhase::Migrate).entered();
        MIGRATOR.run(pool).await.context("run migrations")?;
    }
    let newly_applied: Vec<i64> = migrations.iter().filter(|m| !m.applied).map(|m| m.version).collect();
    log.info(format!("🗄️ Applied {} migration(s)", newly_applied.len()));

    let connection_ok = {
        let _s = log.span(&InitPhase::Check).entered();
        match check_connection(pool).await {
            Ok(()) => true,
            Err(e) => {
                log.warn(format!("⚠️  Connection check failed: {e}"));
                false
            }
        }
    };
    if telemetry::config::json_mode() {
        log.result(&InitResult { applied: newly_applied, connection_ok })?;
    }
    Ok(())
}

// Missing bookkeeping table means nothing has been applied yet.
async fn applied_versions(pool: &PgPool) -> Vec<i64> {
    sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success ORDER BY version")
        .fetch_all(pool)
        .await
        .unwrap_or_default()
}

/// copydesk check: is the database reachable and migrated?
pub async fn check(pool: &PgPool) -> Result<()> {
    let log = telemetry::init();
    let _g = log.root_span().entered();
    let _s = log.span(&InitPhase::Check).entered();
    #[derive(Serialize)]
    struct CheckResult {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    }
    let res = match check_connection(pool).await {
        Ok(()) => {
            log.info("✅ Database connection ok");
            CheckResult { ok: true, error: None }
        }
        Err(e) => {
            log.error(format!("❌ Database connection failed: {e}"));
            CheckResult { ok: false, error: Some(e.to_string()) }
        }
    };
    if telemetry::config::json_mode() {
        log.result(&res)?;
    }
    if !res.ok {
        anyhow::bail!("connection check failed");
    }
    Ok(())
}
