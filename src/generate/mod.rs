use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use sqlx::PgPool;
use url::Url;
use uuid::Uuid;

use crate::campaign::PgCampaignStore;
use crate::compose::{GenerationRequest, Platform};
use crate::config::AppConfig;
use crate::llm::ProxyGateway;
use crate::output::types::Meta;
use crate::quota::{PgLedger, QuotaBalance};
use crate::retrieval::TavilySearch;
use crate::telemetry::{self};

pub mod orchestrator;

pub use orchestrator::Orchestrator;

#[derive(Args, Debug)]
pub struct GenerateCmd {
    topic: String,
    #[arg(long)]
    user: Uuid,
    #[arg(long, value_enum)]
    platform: Platform,
    #[arg(long)]
    tone: Option<String>,
    #[arg(long)]
    length: Option<String>,
    #[arg(long)]
    audience: Option<String>,
    /// Save the result as a campaign with this name
    #[arg(long)]
    campaign: Option<String>,
}

#[derive(Serialize)]
struct GenerateResult<'a> {
    text: &'a str,
    platform: Platform,
    remaining: QuotaBalance,
    quota_charged: bool,
    references: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    persisted: Option<bool>,
}

/// Wire the Postgres-backed ledger and store with the HTTP search and gateway clients.
pub fn build_orchestrator(pool: &PgPool, cfg: &AppConfig) -> Result<Orchestrator> {
    // friendly error before any network I/O
    for (what, endpoint) in [("GATEWAY_URL", &cfg.gateway.url), ("SEARCH_ENDPOINT", &cfg.search.endpoint)] {
        Url::parse(endpoint).with_context(|| format!("invalid {what}: {endpoint}"))?;
    }
    if cfg.search.api_key.is_none() {
        telemetry::generate().warn("SEARCH_API_KEY is not set; reference search will likely fail");
    }
    let search = TavilySearch::new(cfg.search.clone()).context("init search client")?;
    let gateway = ProxyGateway::new(cfg.gateway.clone()).context("init gateway client")?;
    Ok(Orchestrator::new(
        Arc::new(PgLedger::new(pool.clone())),
        Arc::new(search),
        Arc::new(gateway),
        Arc::new(PgCampaignStore::new(pool.clone())),
    ))
}

pub async fn run(pool: &PgPool, cfg: &AppConfig, args: GenerateCmd) -> Result<()> {
    let log = telemetry::generate();
    let _g = log
        .root_span_kv([
            ("user", args.user.to_string()),
            ("platform", args.platform.to_string()),
            ("tone", format!("{:?}", args.tone)),
            ("length", format!("{:?}", args.length)),
            ("audience", format!("{:?}", args.audience)),
            ("campaign", format!("{:?}", args.campaign)),
            ("gateway", cfg.gateway.url.clone()),
        ])
        .entered();

    let t0 = Instant::now();
    let orchestrator = build_orchestrator(pool, cfg)?;
    let req = GenerationRequest {
        topic: args.topic,
        platform: args.platform,
        tone: args.tone,
        length: args.length,
        target_audience: args.audience,
        campaign_name: args.campaign,
    };

    let out = match orchestrator.generate(req, args.user).await {
        Ok(out) => out,
        Err(aborted) => {
            if telemetry::config::json_mode() {
                log.failure(aborted.reason.code(), &aborted.message)?;
            }
            return Err(anyhow::Error::new(aborted));
        }
    };

    let persisted = match out.persist {
        Some(task) => {
            let ok = task.wait().await;
            if ok { log.info("💾 Campaign saved"); } else { log.warn("⚠️  Campaign could not be saved"); }
            Some(ok)
        }
        None => None,
    };

    // stdout carries the copy itself in text mode
    let result = GenerateResult {
        text: &out.text,
        platform: args.platform,
        remaining: out.remaining,
        quota_charged: out.quota_charged,
        references: out.references.iter().map(|r| r.source_url.as_str()).collect(),
        persisted,
    };
    let meta = Meta { duration_ms: Some(t0.elapsed().as_millis()), user_id: Some(args.user) };
    log.result_with_meta(&result, meta)?;
    Ok(())
}
