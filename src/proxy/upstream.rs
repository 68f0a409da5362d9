use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;

use crate::config::ProxyConfig;
use crate::llm::gateway::extract_text;

/// The model provider behind the proxy.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// `user` is the message content as received: a string or a list of content blocks.
    async fn complete(&self, system: Option<&str>, user: &Value) -> Result<String, UpstreamError>;
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Non-2xx from the provider; status and body are passed back to the caller.
    #[error("Anthropic API error: {status} {reason}")]
    Status { status: u16, reason: String, body: String },
    #[error("provider response had no text content")]
    Malformed,
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct AnthropicUpstream {
    http: HttpClient,
    cfg: ProxyConfig,
}

impl AnthropicUpstream {
    pub fn new(cfg: ProxyConfig) -> Result<Self, UpstreamError> {
        Ok(Self { http: HttpClient::builder().build()?, cfg })
    }

    fn build_request<'a>(&'a self, system: Option<&'a str>, user: &'a Value) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.cfg.model,
            max_tokens: self.cfg.max_tokens,
            messages: vec![UserMessage { role: "user", content: user }],
            system,
        }
    }
}

#[async_trait]
impl Upstream for AnthropicUpstream {
    async fn complete(&self, system: Option<&str>, user: &Value) -> Result<String, UpstreamError> {
        let response = self
            .http
            .post(&self.cfg.upstream_url)
            .header("x-api-key", &self.cfg.api_key)
            .header("anthropic-version", &self.cfg.anthropic_version)
            .json(&self.build_request(system, user))
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        extract_text(&bytes).map_err(|_| UpstreamError::Malformed)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<UserMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a Value,
}
