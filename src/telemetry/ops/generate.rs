use tracing::{info_span, Span};

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Generate;

#[derive(Copy, Clone, Debug)]
pub enum Phase {
    QuotaCheck,
    Retrieve,
    Compose,
    QuotaRecheck,
    CallLlm,
    Consume,
    Persist,
}

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::QuotaCheck => "quota_check",
            Phase::Retrieve => "retrieve",
            Phase::Compose => "compose",
            Phase::QuotaRecheck => "quota_recheck",
            Phase::CallLlm => "call_llm",
            Phase::Consume => "consume",
            Phase::Persist => "persist",
        }
    }

    fn span(&self) -> Span {
        match self {
            Phase::QuotaCheck => info_span!("quota_check"),
            Phase::Retrieve => info_span!("retrieve"),
            Phase::Compose => info_span!("compose"),
            Phase::QuotaRecheck => info_span!("quota_recheck"),
            Phase::CallLlm => info_span!("call_llm"),
            Phase::Consume => info_span!("consume"),
            Phase::Persist => info_span!("persist"),
        }
    }
}

impl OpMarker for Generate {
    const NAME: &'static str = "generate";
    type Phase = Phase;

    fn root_span() -> Span {
        info_span!("generate")
    }
}
