use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::types::{Campaign, CampaignStatus, CampaignUpdate, NewCampaign, SaveCampaign};
use super::{CampaignError, CampaignStore};

/// Vec-backed store; rows are kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryCampaigns {
    rows: Mutex<Vec<Campaign>>,
    fail_saves: AtomicBool,
    fail_updates: AtomicBool,
}

impl MemoryCampaigns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<Campaign> {
        self.rows.lock().unwrap().clone()
    }

    fn newest_mut<'a>(rows: &'a mut [Campaign], name: &str) -> Option<&'a mut Campaign> {
        rows.iter_mut().rev().find(|c| c.name == name)
    }
}

fn blank(name: String) -> Campaign {
    let now = Utc::now();
    Campaign {
        id: Uuid::new_v4(),
        name,
        content: None,
        platform: None,
        user_id: None,
        subject: None,
        target_audience: None,
        reference_links: Vec::new(),
        status: CampaignStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl CampaignStore for MemoryCampaigns {
    async fn create_campaign(&self, new: NewCampaign) -> Result<Campaign, CampaignError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(CampaignError::EmptyName);
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|c| c.name == name) {
            return Err(CampaignError::Duplicate(name));
        }
        let mut c = blank(name);
        c.user_id = new.user_id;
        c.subject = new.subject;
        c.target_audience = new.target_audience;
        c.reference_links = new.reference_links;
        rows.push(c.clone());
        Ok(c)
    }

    async fn update_campaign_content(&self, name: &str, update: CampaignUpdate) -> Result<Campaign, CampaignError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(CampaignError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut rows = self.rows.lock().unwrap();
        let c = Self::newest_mut(&mut rows, name).ok_or_else(|| CampaignError::NotFound(name.to_string()))?;
        if update.content.is_some() { c.content = update.content; }
        if update.platform.is_some() { c.platform = update.platform; }
        if update.subject.is_some() { c.subject = update.subject; }
        if update.target_audience.is_some() { c.target_audience = update.target_audience; }
        if let Some(links) = update.reference_links { c.reference_links = links; }
        c.status = CampaignStatus::Completed;
        c.updated_at = Utc::now();
        Ok(c.clone())
    }

    async fn mark_campaign_error(&self, name: &str) -> Result<Campaign, CampaignError> {
        let mut rows = self.rows.lock().unwrap();
        let c = Self::newest_mut(&mut rows, name).ok_or_else(|| CampaignError::NotFound(name.to_string()))?;
        c.status = CampaignStatus::Error;
        c.updated_at = Utc::now();
        Ok(c.clone())
    }

    async fn save_campaign(&self, save: SaveCampaign) -> bool {
        if self.fail_saves.load(Ordering::SeqCst) {
            return false;
        }
        let mut c = blank(save.name);
        c.content = Some(save.content);
        c.platform = Some(save.platform);
        c.user_id = Some(save.user_id);
        c.status = CampaignStatus::Completed;
        self.rows.lock().unwrap().push(c);
        true
    }

    async fn get_campaign(&self, name: &str) -> Result<Campaign, CampaignError> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| CampaignError::NotFound(name.to_string()))
    }

    async fn list_campaigns(&self, user_id: Uuid, limit: i64) -> Result<Vec<Campaign>, CampaignError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|c| c.user_id == Some(user_id))
            .take(limit.max(1) as usize)
            .cloned()
            .collect())
    }
}
