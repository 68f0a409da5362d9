use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;

/// Sends a composed prompt to the trusted intermediary that holds the model
/// provider's credentials.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String, GatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway returned {status}: {error}")]
    Upstream {
        status: u16,
        error: String,
        details: Option<String>,
    },
    #[error("gateway response had no generated text")]
    MalformedResponse,
    #[error("gateway request failed: {0}")]
    Http(reqwest::Error),
    #[error("gateway request timed out")]
    Timeout,
    #[cfg(test)]
    #[error("mock gateway response queue is empty")]
    MockQueueEmpty,
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { GatewayError::Timeout } else { GatewayError::Http(err) }
    }
}

#[derive(Clone)]
pub struct ProxyGateway {
    http: HttpClient,
    cfg: GatewayConfig,
}

impl ProxyGateway {
    pub fn new(cfg: GatewayConfig) -> Result<Self, GatewayError> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = cfg.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self { http: builder.build()?, cfg })
    }
}

#[async_trait]
impl Gateway for ProxyGateway {
    async fn generate(&self, system: &str, user: &str) -> Result<String, GatewayError> {
        let body = GatewayRequest {
            messages: vec![GatewayMessage { role: "user", content: user }],
            system,
        };

        let mut req = self.http.post(&self.cfg.url).json(&body);
        if let Some(token) = &self.cfg.token {
            req = req.bearer_auth(token);
        }
        let response = req.send().await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(upstream_error(status.as_u16(), &bytes));
        }
        extract_text(&bytes)
    }
}

pub(crate) fn extract_text(bytes: &[u8]) -> Result<String, GatewayError> {
    let parsed: GatewayResponse =
        serde_json::from_slice(bytes).map_err(|_| GatewayError::MalformedResponse)?;
    parsed
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or(GatewayError::MalformedResponse)
}

fn upstream_error(status: u16, bytes: &[u8]) -> GatewayError {
    match serde_json::from_slice::<GatewayErrorBody>(bytes) {
        Ok(body) => GatewayError::Upstream {
            status,
            error: body.error,
            details: body.details.map(|d| match d {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
        },
        Err(_) => GatewayError::Upstream {
            status,
            error: String::from_utf8_lossy(bytes).trim().to_string(),
            details: None,
        },
    }
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    messages: Vec<GatewayMessage<'a>>,
    system: &'a str,
}

#[derive(Debug, Serialize)]
struct GatewayMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: String,
    #[serde(default)]
    details: Option<serde_json::Value>,
}
