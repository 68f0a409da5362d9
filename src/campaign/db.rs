use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::types::{Campaign, CampaignRow, CampaignUpdate, NewCampaign, SaveCampaign};
use super::{CampaignError, CampaignStore};

const CAMPAIGN_COLUMNS: &str = "id, name, content, platform, user_id, subject, target_audience, \
                                reference_links, status, created_at, updated_at";

#[derive(Clone)]
pub struct PgCampaignStore {
    pool: PgPool,
}

impl PgCampaignStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_campaign(row: CampaignRow) -> Result<Campaign, CampaignError> {
    Campaign::try_from(row).map_err(CampaignError::Database)
}

#[async_trait]
impl CampaignStore for PgCampaignStore {
    async fn create_campaign(&self, new: NewCampaign) -> Result<Campaign, CampaignError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(CampaignError::EmptyName);
        }

        let mut tx = self.pool.begin().await?;
        // serialise creators of the same name until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&name)
            .execute(&mut *tx)
            .await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM campaigns WHERE name = $1)")
            .bind(&name)
            .fetch_one(&mut *tx)
            .await?;
        if exists {
            return Err(CampaignError::Duplicate(name));
        }

        let row = sqlx::query_as::<_, CampaignRow>(&format!(
            r#"
            INSERT INTO campaigns (name, user_id, subject, target_audience, reference_links, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        ))
        .bind(&name)
        .bind(new.user_id)
        .bind(new.subject)
        .bind(new.target_audience)
        .bind(new.reference_links)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        into_campaign(row)
    }

    async fn update_campaign_content(&self, name: &str, update: CampaignUpdate) -> Result<Campaign, CampaignError> {
        let row = sqlx::query_as::<_, CampaignRow>(&format!(
            r#"
            UPDATE campaigns
            SET content = COALESCE($2, content),
                platform = COALESCE($3, platform),
                subject = COALESCE($4, subject),
                target_audience = COALESCE($5, target_audience),
                reference_links = COALESCE($6, reference_links),
                status = 'completed',
                updated_at = now()
            WHERE id = (SELECT id FROM campaigns WHERE name = $1 ORDER BY created_at DESC LIMIT 1)
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(update.content)
        .bind(update.platform.map(|p| p.as_str()))
        .bind(update.subject)
        .bind(update.target_audience)
        .bind(update.reference_links)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CampaignError::NotFound(name.to_string()))?;
        into_campaign(row)
    }

    async fn mark_campaign_error(&self, name: &str) -> Result<Campaign, CampaignError> {
        let row = sqlx::query_as::<_, CampaignRow>(&format!(
            r#"
            UPDATE campaigns
            SET status = 'error', updated_at = now()
            WHERE id = (SELECT id FROM campaigns WHERE name = $1 ORDER BY created_at DESC LIMIT 1)
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CampaignError::NotFound(name.to_string()))?;
        into_campaign(row)
    }

    async fn save_campaign(&self, save: SaveCampaign) -> bool {
        let res = sqlx::query(
            r#"
            INSERT INTO campaigns (name, content, platform, user_id, status)
            VALUES ($1, $2, $3, $4, 'completed')
            "#,
        )
        .bind(&save.name)
        .bind(&save.content)
        .bind(save.platform.as_str())
        .bind(save.user_id)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => true,
            Err(e) => {
                warn!(campaign = %save.name, error = %e, "saving campaign failed");
                false
            }
        }
    }

    async fn get_campaign(&self, name: &str) -> Result<Campaign, CampaignError> {
        let row = sqlx::query_as::<_, CampaignRow>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE name = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CampaignError::NotFound(name.to_string()))?;
        into_campaign(row)
    }

    async fn list_campaigns(&self, user_id: Uuid, limit: i64) -> Result<Vec<Campaign>, CampaignError> {
        let rows = sqlx::query_as::<_, CampaignRow>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(into_campaign).collect()
    }
}
