use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Subcommand};
use sqlx::PgPool;
use uuid::Uuid;

use crate::compose::Platform;
use crate::config::AppConfig;
use crate::generate::orchestrator::FulfilError;
use crate::telemetry::{self};
use crate::telemetry::ops::campaign::Phase as CampaignPhase;

pub mod db;
pub mod types;

#[cfg(test)]
pub mod memory;

pub use db::PgCampaignStore;
pub use types::{Campaign, CampaignList, CampaignStatus, CampaignUpdate, NewCampaign, SaveCampaign};

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("campaign with this name already exists: {0}")]
    Duplicate(String),
    #[error("campaign not found: {0}")]
    NotFound(String),
    #[error("campaign name must not be empty")]
    EmptyName,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Named records of generated copy. Only this store changes `status`.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Reserve a uniquely named campaign in `pending`.
    async fn create_campaign(&self, new: NewCampaign) -> Result<Campaign, CampaignError>;
    /// Attach content to the newest campaign with `name` and mark it completed.
    async fn update_campaign_content(&self, name: &str, update: CampaignUpdate) -> Result<Campaign, CampaignError>;
    async fn mark_campaign_error(&self, name: &str) -> Result<Campaign, CampaignError>;
    /// Always inserts a completed row; failures are logged and reported as false.
    async fn save_campaign(&self, save: SaveCampaign) -> bool;
    async fn get_campaign(&self, name: &str) -> Result<Campaign, CampaignError>;
    async fn list_campaigns(&self, user_id: Uuid, limit: i64) -> Result<Vec<Campaign>, CampaignError>;
}

/// copydesk campaign create/get/update/ls/fulfil
#[derive(Args)]
pub struct CampaignCmd {
    #[command(subcommand)]
    pub cmd: CampaignSub,
}

#[derive(Subcommand)]
pub enum CampaignSub {
    // reserve a new campaign in pending state
    Create {
        name: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        audience: Option<String>,
        #[arg(long)]
        user: Option<Uuid>,
        /// Repeatable
        #[arg(long = "reference-link")]
        reference_links: Vec<String>,
    },
    Get {
        name: String,
    },
    // attach content by hand; marks the campaign completed
    Update {
        name: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long, value_enum)]
        platform: Option<Platform>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        audience: Option<String>,
    },
    Ls {
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    // generate content for a pending campaign from its subject and audience
    Fulfil {
        name: String,
        #[arg(long, value_enum)]
        platform: Platform,
        #[arg(long)]
        user: Uuid,
    },
}

#[derive(serde::Serialize)]
struct UnrecordedCopy<'a> {
    name: &'a str,
    text: &'a str,
    recorded: bool,
}

pub async fn run(pool: &PgPool, cfg: &AppConfig, args: CampaignCmd) -> Result<()> {
    let store = PgCampaignStore::new(pool.clone());
    let log = telemetry::campaign();
    match args.cmd {
        CampaignSub::Create { name, subject, audience, user, reference_links } => {
            let _g = log.root_span_kv([
                ("name", name.clone()),
                ("subject", format!("{:?}", subject)),
                ("user", format!("{:?}", user)),
            ]).entered();
            let _s = log.span(&CampaignPhase::Create).entered();
            let new = NewCampaign { name, user_id: user, subject, target_audience: audience, reference_links };
            let c = store.create_campaign(new).await.context("create campaign")?;
            log.info(format!("➕ Campaign {} created ({})", c.name, c.status));
            if telemetry::config::json_mode() { log.result(&c)?; }
        }
        CampaignSub::Get { name } => {
            let _g = log.root_span_kv([("name", name.clone())]).entered();
            let _s = log.span(&CampaignPhase::Get).entered();
            let c = store.get_campaign(&name).await?;
            log.info(format!(
                "📣 {} status={} platform={:?} subject={:?} updated_at={}",
                c.name, c.status, c.platform.map(|p| p.as_str()), c.subject, c.updated_at
            ));
            if let Some(content) = &c.content { log.info(content); }
            if telemetry::config::json_mode() { log.result(&c)?; }
        }
        CampaignSub::Update { name, content, platform, subject, audience } => {
            let _g = log.root_span_kv([("name", name.clone())]).entered();
            let _s = log.span(&CampaignPhase::Update).entered();
            let update = CampaignUpdate { content, platform, subject, target_audience: audience, reference_links: None };
            let c = store.update_campaign_content(&name, update).await.context("update campaign")?;
            log.info(format!("✏️ Campaign {} updated ({})", c.name, c.status));
            if telemetry::config::json_mode() { log.result(&c)?; }
        }
        CampaignSub::Ls { user, limit } => {
            let _g = log.root_span_kv([("user", user.to_string()), ("limit", limit.to_string())]).entered();
            let _s = log.span(&CampaignPhase::List).entered();
            let campaigns = store.list_campaigns(user, limit).await?;
            log.info("📚 Campaigns:");
            for c in &campaigns {
                log.info(format!(
                    "{} status={} platform={:?} created_at={}",
                    c.name, c.status, c.platform.map(|p| p.as_str()), c.created_at
                ));
            }
            if telemetry::config::json_mode() { log.result(&CampaignList { campaigns })?; }
        }
        CampaignSub::Fulfil { name, platform, user } => {
            let _g = log.root_span_kv([
                ("name", name.clone()),
                ("platform", platform.to_string()),
                ("user", user.to_string()),
            ]).entered();
            let _s = log.span(&CampaignPhase::Fulfil).entered();
            let orchestrator = crate::generate::build_orchestrator(pool, cfg)?;
            let c = match orchestrator.fulfil_campaign(&name, platform, user).await {
                Ok(c) => c,
                // quota already charged; still print the copy
                Err(FulfilError::NotRecorded { text, source }) => {
                    log.warn(format!("⚠️  Campaign {name} not updated: {source}"));
                    log.info(&text);
                    if telemetry::config::json_mode() {
                        log.result(&UnrecordedCopy { name: &name, text: &text, recorded: false })?;
                    }
                    return Ok(());
                }
                Err(e) => return Err(e).with_context(|| format!("fulfil campaign {name}")),
            };
            log.info(format!("✅ Campaign {} {}", c.name, c.status));
            if let Some(content) = &c.content { log.info(content); }
            if telemetry::config::json_mode() { log.result(&c)?; }
        }
    }
    Ok(())
}
