use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::compose::Platform;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Pending,
    Completed,
    Error,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Pending => "pending",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Error => "error",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown campaign status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for CampaignStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CampaignStatus::Pending),
            "completed" => Ok(CampaignStatus::Completed),
            "error" => Ok(CampaignStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub content: Option<String>,
    pub platform: Option<Platform>,
    pub user_id: Option<Uuid>,
    pub subject: Option<String>,
    pub target_audience: Option<String>,
    pub reference_links: Vec<String>,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A campaign reserved ahead of generation; inserted as `pending`.
#[derive(Clone, Debug, Default)]
pub struct NewCampaign {
    pub name: String,
    pub user_id: Option<Uuid>,
    pub subject: Option<String>,
    pub target_audience: Option<String>,
    pub reference_links: Vec<String>,
}

/// Fields left `None` keep their stored value.
#[derive(Clone, Debug, Default)]
pub struct CampaignUpdate {
    pub content: Option<String>,
    pub platform: Option<Platform>,
    pub subject: Option<String>,
    pub target_audience: Option<String>,
    pub reference_links: Option<Vec<String>>,
}

/// The orchestrator's append path: one completed row per generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveCampaign {
    pub name: String,
    pub content: String,
    pub platform: Platform,
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CampaignList {
    pub campaigns: Vec<Campaign>,
}

// Raw `campaigns` row; text columns are parsed into enums on the way out.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CampaignRow {
    pub id: Uuid,
    pub name: String,
    pub content: Option<String>,
    pub platform: Option<String>,
    pub user_id: Option<Uuid>,
    pub subject: Option<String>,
    pub target_audience: Option<String>,
    pub reference_links: Vec<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = sqlx::Error;

    fn try_from(r: CampaignRow) -> Result<Self, Self::Error> {
        let platform = r
            .platform
            .as_deref()
            .map(Platform::from_str)
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let status = r
            .status
            .parse::<CampaignStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Campaign {
            id: r.id,
            name: r.name,
            content: r.content,
            platform,
            user_id: r.user_id,
            subject: r.subject,
            target_audience: r.target_audience,
            reference_links: r.reference_links,
            status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}
