use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::telemetry::{self};
use crate::telemetry::ops::profile::Phase as ProfilePhase;

mod db;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub updated_at: DateTime<Utc>,
}

/// Fields left `None` are not touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.full_name.is_none()
    }
}

/// copydesk profile show/update
#[derive(Args)]
pub struct ProfileCmd {
    #[command(subcommand)]
    pub cmd: ProfileSub,
}

#[derive(Subcommand)]
pub enum ProfileSub {
    Show {
        #[arg(long)]
        user: Uuid,
    },
    Update {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
    },
}

pub async fn run(pool: &PgPool, args: ProfileCmd) -> Result<()> {
    let log = telemetry::profile();
    match args.cmd {
        ProfileSub::Show { user } => {
            let _g = log.root_span_kv([("user", user.to_string())]).entered();
            let _s = log.span(&ProfilePhase::Fetch).entered();
            let Some(profile) = db::get_profile(pool, user).await? else {
                bail!("no profile for user {user}");
            };
            log.info(format!("👤 {} <{}> {}", profile.id, profile.email, profile.full_name));
            if telemetry::config::json_mode() { log.result(&profile)?; }
        }
        ProfileSub::Update { user, email, full_name } => {
            let _g = log.root_span_kv([
                ("user", user.to_string()),
                ("email", format!("{:?}", email)),
                ("full_name", format!("{:?}", full_name)),
            ]).entered();
            let update = ProfileUpdate { email, full_name };
            if update.is_empty() {
                bail!("nothing to update; pass --email and/or --full-name");
            }
            let _s = log.span(&ProfilePhase::Update).entered();
            let profile = db::update_profile(pool, user, &update)
                .await
                .with_context(|| format!("update profile {user}"))?;
            let Some(profile) = profile else {
                bail!("no profile for user {user}");
            };
            log.info(format!("✏️ Profile updated: {} <{}>", profile.full_name, profile.email));
            if telemetry::config::json_mode() { log.result(&profile)?; }
        }
    }
    Ok(())
}
