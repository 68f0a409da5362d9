use tracing::{info_span, Span};

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Proxy;

#[derive(Copy, Clone, Debug)]
pub enum Phase {
    Bind,
    Forward,
}

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Bind => "bind",
            Phase::Forward => "forward",
        }
    }

    fn span(&self) -> Span {
        match self {
            Phase::Bind => info_span!("bind"),
            Phase::Forward => info_span!("forward"),
        }
    }
}

impl OpMarker for Proxy {
    const NAME: &'static str = "proxy";
    type Phase = Phase;

    fn root_span() -> Span {
        info_span!("proxy")
    }
}
