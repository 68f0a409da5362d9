use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Campaign;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Create, Update, Get, List, Fulfil }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::Create => "create",
        Phase::Update => "update",
        Phase::Get => "get",
        Phase::List => "list",
        Phase::Fulfil => "fulfil",
    }}
    fn span(&self) -> Span { match self {
        Phase::Create => info_span!("create"),
        Phase::Update => info_span!("update"),
        Phase::Get => info_span!("get"),
        Phase::List => info_span!("list"),
        Phase::Fulfil => info_span!("fulfil"),
    }}
}

impl OpMarker for Campaign {
    const NAME: &'static str = "campaign";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("campaign") }
}
