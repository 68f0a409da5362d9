pub mod config;
pub mod ctx;
pub mod ops;

use std::marker::PhantomData;

use ctx::LogCtx;

// Typed log contexts, one per CLI operation
pub fn init() -> LogCtx<ops::init::Init> { LogCtx { json: config::logs_are_json(), _marker: PhantomData } }
pub fn generate() -> LogCtx<ops::generate::Generate> { LogCtx { json: config::logs_are_json(), _marker: PhantomData } }
pub fn campaign() -> LogCtx<ops::campaign::Campaign> { LogCtx { json: config::logs_are_json(), _marker: PhantomData } }
pub fn quota() -> LogCtx<ops::quota::Quota> { LogCtx { json: config::logs_are_json(), _marker: PhantomData } }
pub fn plan() -> LogCtx<ops::plan::Plan> { LogCtx { json: config::logs_are_json(), _marker: PhantomData } }
pub fn profile() -> LogCtx<ops::profile::Profile> { LogCtx { json: config::logs_are_json(), _marker: PhantomData } }
pub fn proxy() -> LogCtx<ops::proxy::Proxy> { LogCtx { json: config::logs_are_json(), _marker: PhantomData } }
