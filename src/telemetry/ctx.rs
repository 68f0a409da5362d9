use anyhow::Result;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{info, debug, warn, error, Span};

use crate::output::config::OutputConfig;
use crate::output::types::{Envelope, Meta};
use crate::output::Emitter;

pub trait PhaseSpan {
    fn name(&self) -> &'static str;
    fn span(&self) -> Span;
}

pub trait OpMarker {
    const NAME: &'static str;
    type Phase: PhaseSpan;
    fn root_span() -> Span;
}

pub struct LogCtx<O: OpMarker> {
    pub(crate) json: bool,
    pub(crate) _marker: PhantomData<O>,
}

impl<O: OpMarker> LogCtx<O> {
    fn op_name(&self) -> &'static str { O::NAME }

    pub fn root_span(&self) -> Span { O::root_span() }

    pub fn root_span_kv<'a, T>(&self, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.root_span();
        let details = kv_to_string(fields);
        if details.is_empty() {
            info!(op = %self.op_name(), "start");
        } else {
            info!(op = %self.op_name(), details = %details, "start");
        }
        span
    }

    pub fn span(&self, ph: &O::Phase) -> Span {
        debug!(op = %self.op_name(), phase = ph.name(), "span_start");
        ph.span()
    }

    pub fn info(&self, msg: impl AsRef<str>) { if self.json { info!(op = %self.op_name(), "{}", msg.as_ref()); } else { info!("{}", msg.as_ref()); } }
    pub fn warn(&self, msg: impl AsRef<str>) { if self.json { warn!(op = %self.op_name(), "{}", msg.as_ref()); } else { warn!("{}", msg.as_ref()); } }
    pub fn error(&self, msg: impl AsRef<str>) { if self.json { error!(op = %self.op_name(), "{}", msg.as_ref()); } else { error!("{}", msg.as_ref()); } }

    pub fn info_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        if self.json { let details = kv_to_string(kv); info!(op = %self.op_name(), details = %details, "{}", msg); }
        else { info!("{}", msg); }
    }

    pub fn warn_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        if self.json { let details = kv_to_string(kv); warn!(op = %self.op_name(), details = %details, "{}", msg); }
        else { warn!("{}", msg); }
    }

    pub fn plan<T: Serialize>(&self, plan: &T) -> Result<()> {
        let env = Envelope::plan(self.op_name(), plan, None)?;
        emit(&env)
    }

    pub fn result<T: Serialize>(&self, result: &T) -> Result<()> {
        let env = Envelope::result(self.op_name(), result, None)?;
        emit(&env)
    }

    pub fn result_with_meta<T: Serialize>(&self, result: &T, meta: Meta) -> Result<()> {
        let env = Envelope::result(self.op_name(), result, Some(meta))?;
        emit(&env)
    }

    pub fn failure(&self, code: &str, message: &str) -> Result<()> {
        let env = Envelope::error(self.op_name(), code, message, None);
        emit(&env)
    }
}

// Generate-specific helpers
impl LogCtx<crate::telemetry::ops::generate::Generate> {
    pub fn generated(&self, chars: usize, references: usize, remaining: &str, charged: bool) {
        if self.json { info!(op = %self.op_name(), chars, references, remaining, charged, "generated"); }
        else { info!("✅ Generated {} chars from {} reference(s) — remaining={} charged={}", chars, references, remaining, charged); }
    }

    pub fn aborted(&self, code: &str, message: &str) {
        if self.json { warn!(op = %self.op_name(), code, message, "aborted"); }
        else { warn!("⛔ Aborted [{}] — {}", code, message); }
    }
}

fn emit(env: &Envelope) -> Result<()> {
    let emitter = Emitter::from_env(OutputConfig::from_env());
    emitter.emit(env).map_err(anyhow::Error::from)
}

fn kv_to_string<'a, T>(kv: T) -> String
where
    T: IntoIterator<Item = (&'a str, String)>,
{
    let mut parts: Vec<String> = Vec::new();
    for (k, v) in kv { parts.push(format!("{}={}", k, v)); }
    parts.join(" ")
}
