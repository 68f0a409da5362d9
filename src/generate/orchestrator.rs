//! The generation pipeline: quota check, retrieval, composition, a second quota
//! check, the gateway call, the quota charge and optional persistence, in that
//! order. Every collaborator sits behind a trait object so the orchestrator can
//! be shared across concurrent requests and driven by fakes in tests.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug};
use uuid::Uuid;

use crate::campaign::{Campaign, CampaignError, CampaignStatus, CampaignStore, CampaignUpdate, SaveCampaign};
use crate::compose::{self, GenerationRequest, Platform};
use crate::llm::Gateway;
use crate::quota::{QuotaBalance, QuotaLedger};
use crate::retrieval::{ReferenceDocument, SearchProvider};
use crate::telemetry::{self};
use crate::telemetry::ops::generate::Phase as GeneratePhase;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    QuotaChecked,
    Retrieved,
    Composed,
    Generated,
    QuotaConsumed,
    Persisted,
    Done,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    QuotaExceeded,
    QuotaUnavailable,
    GenerationFailed,
    InvalidRequest,
}

impl AbortReason {
    pub fn code(&self) -> &'static str {
        match self {
            AbortReason::QuotaExceeded => "quota_exceeded",
            AbortReason::QuotaUnavailable => "quota_unavailable",
            AbortReason::GenerationFailed => "generation_failed",
            AbortReason::InvalidRequest => "invalid_request",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Terminal failure of a request. `stage` is the last stage reached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("[{reason}] {message}")]
pub struct Aborted {
    pub reason: AbortReason,
    pub stage: Stage,
    pub message: String,
}

impl Aborted {
    fn new(reason: AbortReason, stage: Stage, message: impl Into<String>) -> Self {
        Self { reason, stage, message: message.into() }
    }
}

/// Handle on the background campaign write.
#[derive(Debug)]
pub struct PersistTask {
    handle: JoinHandle<bool>,
}

impl PersistTask {
    /// Resolves to whether the campaign row was written.
    pub async fn wait(self) -> bool {
        self.handle.await.unwrap_or(false)
    }
}

#[derive(Debug)]
pub struct Generated {
    pub text: String,
    pub references: Vec<ReferenceDocument>,
    pub remaining: QuotaBalance,
    pub quota_charged: bool,
    pub persist: Option<PersistTask>,
}

#[derive(Debug, thiserror::Error)]
pub enum FulfilError {
    #[error(transparent)]
    Campaign(#[from] CampaignError),
    #[error("campaign already completed: {0}")]
    AlreadyCompleted(String),
    #[error(transparent)]
    Aborted(Aborted),
    /// Copy was generated and charged but could not be attached to the campaign.
    #[error("generated copy was not recorded on the campaign: {source}")]
    NotRecorded { text: String, source: CampaignError },
}

pub struct Orchestrator {
    ledger: Arc<dyn QuotaLedger>,
    search: Arc<dyn SearchProvider>,
    gateway: Arc<dyn Gateway>,
    campaigns: Arc<dyn CampaignStore>,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<dyn QuotaLedger>,
        search: Arc<dyn SearchProvider>,
        gateway: Arc<dyn Gateway>,
        campaigns: Arc<dyn CampaignStore>,
    ) -> Self {
        Self { ledger, search, gateway, campaigns }
    }

    pub async fn generate(&self, req: GenerationRequest, user_id: Uuid) -> Result<Generated, Aborted> {
        let log = telemetry::generate();
        let req = req.normalized();

        let result = self.run_pipeline(&req, user_id).await;
        match &result {
            Ok(out) => log.generated(
                out.text.chars().count(),
                out.references.len(),
                &out.remaining.to_string(),
                out.quota_charged,
            ),
            Err(aborted) => log.aborted(aborted.reason.code(), &aborted.message),
        }
        result
    }

    async fn run_pipeline(&self, req: &GenerationRequest, user_id: Uuid) -> Result<Generated, Aborted> {
        let log = telemetry::generate();
        let mut stage = Stage::Idle;
        if req.topic.is_empty() {
            return Err(Aborted::new(AbortReason::InvalidRequest, stage, "topic must not be empty"));
        }

        self.check_quota(user_id, stage)
            .instrument(log.span(&GeneratePhase::QuotaCheck))
            .await?;
        advance(&mut stage, Stage::QuotaChecked);

        let references = match self
            .search
            .search(&req.topic)
            .instrument(log.span(&GeneratePhase::Retrieve))
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                log.warn_kv("reference search failed; continuing without references", [("error", e.to_string())]);
                Vec::new()
            }
        };
        advance(&mut stage, Stage::Retrieved);

        let prompt = {
            let _s = log.span(&GeneratePhase::Compose).entered();
            compose::compose(req, &references)
                .map_err(|e| Aborted::new(AbortReason::InvalidRequest, stage, e.to_string()))?
        };
        advance(&mut stage, Stage::Composed);

        // the first check may be stale by now
        self.check_quota(user_id, stage)
            .instrument(log.span(&GeneratePhase::QuotaRecheck))
            .await?;

        let text = self
            .gateway
            .generate(&prompt.system, &prompt.user)
            .instrument(log.span(&GeneratePhase::CallLlm))
            .await
            .map_err(|e| Aborted::new(AbortReason::GenerationFailed, stage, e.to_string()))?;
        advance(&mut stage, Stage::Generated);

        let quota_charged = self
            .ledger
            .consume(user_id)
            .instrument(log.span(&GeneratePhase::Consume))
            .await;
        if !quota_charged {
            log.warn_kv("generation succeeded but quota was not charged", [("user", user_id.to_string())]);
        }
        advance(&mut stage, Stage::QuotaConsumed);

        let remaining = match self.ledger.remaining(user_id).await {
            Ok(r) => QuotaBalance::from_remaining(r),
            Err(e) => {
                log.warn_kv("remaining quota unavailable after generation", [("error", e.to_string())]);
                QuotaBalance::Unknown
            }
        };

        let persist = req.campaign_name.as_ref().map(|name| {
            self.spawn_persist(SaveCampaign {
                name: name.clone(),
                content: text.clone(),
                platform: req.platform,
                user_id,
            })
        });
        if persist.is_some() {
            advance(&mut stage, Stage::Persisted);
        }
        advance(&mut stage, Stage::Done);

        Ok(Generated { text, references, remaining, quota_charged, persist })
    }

    async fn check_quota(&self, user_id: Uuid, stage: Stage) -> Result<(), Aborted> {
        match self.ledger.can_generate(user_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Aborted::new(
                AbortReason::QuotaExceeded,
                stage,
                "generation limit reached for the current plan",
            )),
            Err(e) => Err(Aborted::new(
                AbortReason::QuotaUnavailable,
                stage,
                format!("quota could not be verified: {e}"),
            )),
        }
    }

    fn spawn_persist(&self, save: SaveCampaign) -> PersistTask {
        let store = Arc::clone(&self.campaigns);
        let span = telemetry::generate().span(&GeneratePhase::Persist);
        let handle = tokio::spawn(async move { store.save_campaign(save).await }.instrument(span));
        PersistTask { handle }
    }

    /// Generate content for a campaign reserved with `create_campaign`, using its
    /// subject as the topic. A gateway failure marks the campaign as errored.
    pub async fn fulfil_campaign(&self, name: &str, platform: Platform, user_id: Uuid) -> Result<Campaign, FulfilError> {
        let campaign = self.campaigns.get_campaign(name).await?;
        if campaign.status == CampaignStatus::Completed {
            return Err(FulfilError::AlreadyCompleted(campaign.name));
        }

        let topic = campaign.subject.clone().unwrap_or_else(|| campaign.name.clone());
        let mut req = GenerationRequest::new(topic, platform);
        req.target_audience = campaign.target_audience.clone();

        match self.generate(req, user_id).await {
            Ok(out) => {
                let links: Vec<String> = out.references.iter().map(|r| r.source_url.clone()).collect();
                let update = CampaignUpdate {
                    content: Some(out.text.clone()),
                    platform: Some(platform),
                    reference_links: (!links.is_empty()).then_some(links),
                    ..CampaignUpdate::default()
                };
                match self.campaigns.update_campaign_content(name, update).await {
                    Ok(c) => Ok(c),
                    Err(source) => {
                        telemetry::generate().warn_kv(
                            "campaign update failed after generation; returning copy unrecorded",
                            [("campaign", name.to_string()), ("error", source.to_string())],
                        );
                        Err(FulfilError::NotRecorded { text: out.text, source })
                    }
                }
            }
            Err(aborted) => {
                if aborted.reason == AbortReason::GenerationFailed {
                    if let Err(e) = self.campaigns.mark_campaign_error(name).await {
                        telemetry::generate().warn_kv("could not mark campaign as errored", [("error", e.to_string())]);
                    }
                }
                Err(FulfilError::Aborted(aborted))
            }
        }
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!(from = ?*stage, to = ?next, "stage");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::memory::MemoryCampaigns;
    use crate::llm::gateway::GatewayError;
    use crate::llm::mock::MockGateway;
    use crate::quota::memory::MemoryLedger;
    use crate::retrieval::RetrievalError;
    use crate::retrieval::mock::MockSearch;

    struct Harness {
        ledger: Arc<MemoryLedger>,
        search: Arc<MockSearch>,
        gateway: Arc<MockGateway>,
        campaigns: Arc<MemoryCampaigns>,
        orchestrator: Arc<Orchestrator>,
    }

    fn harness() -> Harness {
        let ledger = Arc::new(MemoryLedger::new());
        let search = Arc::new(MockSearch::new());
        let gateway = Arc::new(MockGateway::new());
        let campaigns = Arc::new(MemoryCampaigns::new());
        let orchestrator = Arc::new(Orchestrator::new(
            ledger.clone(),
            search.clone(),
            gateway.clone(),
            campaigns.clone(),
        ));
        Harness { ledger, search, gateway, campaigns, orchestrator }
    }

    #[tokio::test]
    async fn exhausted_quota_aborts_without_calling_gateway() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, Some(5), 5);

        let err = h
            .orchestrator
            .generate(GenerationRequest::new("solar", Platform::Blog), user)
            .await
            .unwrap_err();
        assert_eq!(err.reason, AbortReason::QuotaExceeded);
        assert_eq!(err.reason.code(), "quota_exceeded");
        assert_eq!(err.stage, Stage::Idle);
        assert!(h.gateway.calls().is_empty());
        assert!(h.search.calls().is_empty());
        assert_eq!(h.ledger.used(user), Some(5));
    }

    #[tokio::test]
    async fn unreadable_quota_fails_closed() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, Some(5), 0);
        h.ledger.set_fail_lookups(true);

        let err = h
            .orchestrator
            .generate(GenerationRequest::new("solar", Platform::Blog), user)
            .await
            .unwrap_err();
        assert_eq!(err.reason, AbortReason::QuotaUnavailable);
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_subscription_fails_closed() {
        let h = harness();
        let err = h
            .orchestrator
            .generate(GenerationRequest::new("solar", Platform::Blog), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.reason, AbortReason::QuotaUnavailable);
    }

    #[tokio::test]
    async fn blank_topic_is_invalid_before_any_io() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, None, 0);

        let err = h
            .orchestrator
            .generate(GenerationRequest::new("   ", Platform::Twitter), user)
            .await
            .unwrap_err();
        assert_eq!(err.reason, AbortReason::InvalidRequest);
        assert!(h.search.calls().is_empty());
        assert_eq!(h.ledger.consume_calls(), 0);
    }

    #[tokio::test]
    async fn twitter_request_uses_tweet_template_and_calls_gateway_once() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, Some(50), 49);
        h.search.push_docs(&[
            ("https://news.example/ev", "EV registrations doubled in 2024."),
            ("https://news.example/grid", "Grid operators plan new chargers."),
        ]);
        h.gateway.push_text("⚡ EVs are here. #EV #CleanTech");

        let out = h
            .orchestrator
            .generate(GenerationRequest::new("electric vehicles", Platform::Twitter), user)
            .await
            .unwrap();

        let calls = h.gateway.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].system.contains("280 characters"));
        assert!(calls[0].system.contains("1-3 relevant hashtags"));
        assert!(calls[0].system.contains(
            "EV registrations doubled in 2024.\n\nGrid operators plan new chargers."
        ));
        assert_eq!(calls[0].user, "Please write a twitter post about: electric vehicles");

        assert_eq!(out.text, "⚡ EVs are here. #EV #CleanTech");
        assert!(out.quota_charged);
        assert_eq!(out.remaining, QuotaBalance::Limited(0));
        assert_eq!(h.ledger.used(user), Some(50));
        assert!(out.persist.is_none());
    }

    #[tokio::test]
    async fn gateway_failure_leaves_quota_untouched() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, Some(5), 2);
        h.gateway.push_response(Err(GatewayError::Upstream {
            status: 500,
            error: "Anthropic API error: 500".into(),
            details: None,
        }));

        let err = h
            .orchestrator
            .generate(GenerationRequest::new("solar", Platform::Linkedin), user)
            .await
            .unwrap_err();
        assert_eq!(err.reason, AbortReason::GenerationFailed);
        assert_eq!(err.stage, Stage::Composed);
        assert_eq!(h.ledger.used(user), Some(2));
        assert_eq!(h.ledger.consume_calls(), 0);
    }

    #[tokio::test]
    async fn retrieval_failure_still_produces_text() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, None, 0);
        h.search.push_response(Err(RetrievalError::Status { status: 401, body: "bad key".into() }));
        h.gateway.push_text("post");

        let out = h
            .orchestrator
            .generate(GenerationRequest::new("solar", Platform::Blog), user)
            .await
            .unwrap();
        assert_eq!(out.text, "post");
        assert!(out.references.is_empty());
        assert_eq!(out.remaining, QuotaBalance::Unlimited);
        assert!(h.gateway.calls()[0].system.ends_with("Use the following reference content: "));
    }

    #[tokio::test]
    async fn concurrent_generations_increment_exactly_once_each() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, None, 0);
        for _ in 0..8 {
            h.gateway.push_text("ok");
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let orch = h.orchestrator.clone();
            handles.push(tokio::spawn(async move {
                orch.generate(GenerationRequest::new("solar", Platform::Blog), user).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().quota_charged);
        }
        assert_eq!(h.ledger.used(user), Some(8));
    }

    #[tokio::test]
    async fn concurrent_generations_never_exceed_the_cap() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, Some(3), 0);
        for _ in 0..10 {
            h.gateway.push_text("ok");
        }

        let mut handles = Vec::new();
        for _ in 0..10 {
            let orch = h.orchestrator.clone();
            handles.push(tokio::spawn(async move {
                orch.generate(GenerationRequest::new("solar", Platform::Blog), user).await
            }));
        }
        let mut charged = 0;
        for handle in handles {
            if let Ok(out) = handle.await.unwrap() {
                if out.quota_charged {
                    charged += 1;
                }
            }
        }
        assert_eq!(charged, 3);
        assert_eq!(h.ledger.used(user), Some(3));
    }

    #[tokio::test]
    async fn campaign_name_persists_in_background_task() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, Some(10), 0);
        h.gateway.push_text("launch copy");

        let mut req = GenerationRequest::new("solar", Platform::Linkedin);
        req.campaign_name = Some("spring-launch".into());
        let out = h.orchestrator.generate(req, user).await.unwrap();

        let task = out.persist.expect("persist task");
        assert!(task.wait().await);
        let rows = h.campaigns.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "spring-launch");
        assert_eq!(rows[0].content.as_deref(), Some("launch copy"));
        assert_eq!(rows[0].platform, Some(Platform::Linkedin));
        assert_eq!(rows[0].status, CampaignStatus::Completed);
    }

    #[tokio::test]
    async fn failed_persistence_keeps_text_and_charge() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, Some(10), 0);
        h.campaigns.set_fail_saves(true);
        h.gateway.push_text("copy");

        let mut req = GenerationRequest::new("solar", Platform::Blog);
        req.campaign_name = Some("q4".into());
        let out = h.orchestrator.generate(req, user).await.unwrap();

        assert_eq!(out.text, "copy");
        assert!(out.quota_charged);
        assert!(!out.persist.expect("persist task").wait().await);
        assert_eq!(h.ledger.used(user), Some(1));
        assert!(h.campaigns.rows().is_empty());
    }

    #[tokio::test]
    async fn blank_campaign_name_skips_persistence() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, None, 0);
        h.gateway.push_text("copy");

        let mut req = GenerationRequest::new("solar", Platform::Blog);
        req.campaign_name = Some("  ".into());
        let out = h.orchestrator.generate(req, user).await.unwrap();
        assert!(out.persist.is_none());
    }

    #[tokio::test]
    async fn fulfil_completes_pending_campaign_with_references() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, Some(10), 0);
        h.campaigns
            .create_campaign(crate::campaign::NewCampaign {
                name: "heat".into(),
                subject: Some("heat pumps".into()),
                target_audience: Some("landlords".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        h.search.push_docs(&[("https://news.example/hp", "Heat pump sales up.")]);
        h.gateway.push_text("Heat pumps pay off.");

        let c = h.orchestrator.fulfil_campaign("heat", Platform::Linkedin, user).await.unwrap();
        assert_eq!(c.status, CampaignStatus::Completed);
        assert_eq!(c.content.as_deref(), Some("Heat pumps pay off."));
        assert_eq!(c.reference_links, vec!["https://news.example/hp".to_string()]);
        assert_eq!(h.search.calls(), vec!["heat pumps".to_string()]);
        assert!(h.gateway.calls()[0].system.contains("Target Audience: landlords"));
        assert_eq!(h.ledger.used(user), Some(1));
    }

    #[tokio::test]
    async fn fulfil_marks_error_when_generation_fails() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, Some(10), 0);
        h.campaigns
            .create_campaign(crate::campaign::NewCampaign { name: "heat".into(), ..Default::default() })
            .await
            .unwrap();
        h.gateway.push_response(Err(GatewayError::MalformedResponse));

        let err = h.orchestrator.fulfil_campaign("heat", Platform::Blog, user).await.unwrap_err();
        assert!(matches!(err, FulfilError::Aborted(ref a) if a.reason == AbortReason::GenerationFailed));
        assert_eq!(h.campaigns.get_campaign("heat").await.unwrap().status, CampaignStatus::Error);
    }

    #[tokio::test]
    async fn fulfil_leaves_campaign_pending_when_quota_exhausted() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, Some(1), 1);
        h.campaigns
            .create_campaign(crate::campaign::NewCampaign { name: "heat".into(), ..Default::default() })
            .await
            .unwrap();

        let err = h.orchestrator.fulfil_campaign("heat", Platform::Blog, user).await.unwrap_err();
        assert!(matches!(err, FulfilError::Aborted(ref a) if a.reason == AbortReason::QuotaExceeded));
        assert_eq!(h.campaigns.get_campaign("heat").await.unwrap().status, CampaignStatus::Pending);
    }

    #[tokio::test]
    async fn fulfil_returns_copy_when_campaign_update_fails() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, Some(10), 0);
        h.campaigns
            .create_campaign(crate::campaign::NewCampaign { name: "heat".into(), ..Default::default() })
            .await
            .unwrap();
        h.campaigns.set_fail_updates(true);
        h.gateway.push_text("Heat pumps pay off.");

        let err = h.orchestrator.fulfil_campaign("heat", Platform::Blog, user).await.unwrap_err();
        match err {
            FulfilError::NotRecorded { text, source } => {
                assert_eq!(text, "Heat pumps pay off.");
                assert!(matches!(source, CampaignError::Database(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.ledger.used(user), Some(1));
        assert_eq!(h.gateway.calls().len(), 1);
        assert_eq!(h.campaigns.get_campaign("heat").await.unwrap().status, CampaignStatus::Pending);
    }

    #[tokio::test]
    async fn fulfil_rejects_completed_campaign() {
        let h = harness();
        let user = Uuid::new_v4();
        h.ledger.subscribe(user, None, 0);
        h.campaigns
            .save_campaign(SaveCampaign { name: "done".into(), content: "x".into(), platform: Platform::Blog, user_id: user })
            .await;
        let err = h.orchestrator.fulfil_campaign("done", Platform::Blog, user).await.unwrap_err();
        assert!(matches!(err, FulfilError::AlreadyCompleted(_)));
        assert!(h.gateway.calls().is_empty());
    }
}
