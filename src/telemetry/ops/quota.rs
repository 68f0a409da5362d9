use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Quota;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Lookup, Plan, Renew }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self { Phase::Lookup => "lookup", Phase::Plan => "plan", Phase::Renew => "renew" } }
    fn span(&self) -> Span { match self { Phase::Lookup => info_span!("lookup"), Phase::Plan => info_span!("plan"), Phase::Renew => info_span!("renew") } }
}

impl OpMarker for Quota {
    const NAME: &'static str = "quota";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("quota") }
}
