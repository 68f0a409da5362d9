//! `copydesk proxy`: the trusted intermediary between the generation gateway
//! client and the model provider. It is the only process that sees the
//! provider key.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Args;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::telemetry::{self};
use crate::telemetry::ops::proxy::Phase as ProxyPhase;

mod upstream;

pub use upstream::{AnthropicUpstream, Upstream, UpstreamError};

#[derive(Args, Debug)]
pub struct ProxyCmd {
    /// Overrides PROXY_BIND
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[derive(Clone)]
pub struct ProxyState {
    upstream: Arc<dyn Upstream>,
}

impl ProxyState {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self { upstream }
    }
}

#[derive(Debug, Deserialize)]
struct ForwardRequest {
    messages: Vec<ForwardMessage>,
    #[serde(default)]
    system: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForwardMessage {
    #[serde(default)]
    content: Value,
}

pub fn router(state: ProxyState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]);

    Router::new()
        .route("/", post(forward).options(preflight))
        .route("/claude-proxy", post(forward).options(preflight))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

pub async fn run(args: ProxyCmd) -> Result<()> {
    let log = telemetry::proxy();
    let mut cfg = ProxyConfig::from_env()?;
    if let Some(bind) = args.bind {
        cfg.bind = bind;
    }
    let addr = cfg.bind;
    let _g = log
        .root_span_kv([
            ("bind", addr.to_string()),
            ("model", cfg.model.clone()),
            ("upstream", cfg.upstream_url.clone()),
        ])
        .entered();

    let upstream = AnthropicUpstream::new(cfg).context("init provider client")?;
    let app = router(ProxyState::new(Arc::new(upstream)));

    let listener = {
        let _s = log.span(&ProxyPhase::Bind).entered();
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind proxy to {addr}"))?
    };
    log.info(format!("🚀 Proxy listening on http://{addr}"));

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("proxy server")?;
    log.info("Proxy stopped");
    Ok(())
}

async fn preflight() -> &'static str {
    "ok"
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn forward(State(state): State<ProxyState>, body: Bytes) -> Response {
    let log = telemetry::proxy();
    let req: ForwardRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => return internal_error(format!("invalid request body: {e}")),
    };
    // only the first message is forwarded, as the user turn
    let Some(first) = req.messages.into_iter().next() else {
        return internal_error("messages must contain at least one entry".to_string());
    };

    let result = state
        .upstream
        .complete(req.system.as_deref(), &first.content)
        .instrument(log.span(&ProxyPhase::Forward))
        .await;

    match result {
        Ok(text) => {
            log.info_kv("forwarded", [("chars", text.chars().count().to_string())]);
            Json(json!({ "content": [{ "text": text }] })).into_response()
        }
        Err(UpstreamError::Status { status, reason, body }) => {
            log.warn_kv("provider rejected request", [("status", status.to_string())]);
            // reqwest and axum sit on different `http` versions
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            let error = format!("Anthropic API error: {status} {reason}");
            (code, Json(json!({ "error": error.trim_end(), "details": body }))).into_response()
        }
        Err(err) => {
            log.warn_kv("provider call failed", [("error", err.to_string())]);
            internal_error(err.to_string())
        }
    }
}

fn internal_error(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message }))).into_response()
}
