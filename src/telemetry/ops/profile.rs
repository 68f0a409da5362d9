use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Profile;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Fetch, Update }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self { Phase::Fetch => "fetch", Phase::Update => "update" } }
    fn span(&self) -> Span { match self { Phase::Fetch => info_span!("fetch"), Phase::Update => info_span!("update") } }
}

impl OpMarker for Profile {
    const NAME: &'static str = "profile";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("profile") }
}
