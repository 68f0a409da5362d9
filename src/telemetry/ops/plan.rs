use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Plan;

#[derive(Copy, Clone, Debug)]
pub enum Phase { List, Show, Preview, Change }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::List => "list",
        Phase::Show => "show",
        Phase::Preview => "preview",
        Phase::Change => "change",
    }}
    fn span(&self) -> Span { match self {
        Phase::List => info_span!("list"),
        Phase::Show => info_span!("show"),
        Phase::Preview => info_span!("preview"),
        Phase::Change => info_span!("change"),
    }}
}

impl OpMarker for Plan {
    const NAME: &'static str = "plan";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("plan") }
}
