use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;

use super::{MAX_REFERENCES, ReferenceDocument, RetrievalError, SearchProvider};

/// Tavily-compatible `POST /search` client.
#[derive(Clone)]
pub struct TavilySearch {
    http: HttpClient,
    cfg: SearchConfig,
}

impl TavilySearch {
    pub fn new(cfg: SearchConfig) -> Result<Self, RetrievalError> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = cfg.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self { http, cfg })
    }

    fn build_request<'a>(&'a self, topic: &'a str) -> ApiSearchRequest<'a> {
        ApiSearchRequest {
            api_key: self.cfg.api_key.as_deref().unwrap_or_default(),
            query: topic,
            search_depth: "basic",
            include_answer: true,
            topic: "news",
            include_raw_content: true,
            max_results: MAX_REFERENCES,
        }
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, topic: &str) -> Result<Vec<ReferenceDocument>, RetrievalError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let response = self
            .http
            .post(&self.cfg.endpoint)
            .json(&self.build_request(topic))
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        parse_results(&bytes)
    }
}

fn parse_results(bytes: &[u8]) -> Result<Vec<ReferenceDocument>, RetrievalError> {
    let parsed: ApiSearchResponse =
        serde_json::from_slice(bytes).map_err(|e| RetrievalError::Malformed(e.to_string()))?;
    Ok(parsed
        .results
        .into_iter()
        .take(MAX_REFERENCES)
        .map(|r| ReferenceDocument { source_url: r.url, content: r.content })
        .collect())
}

#[derive(Debug, Serialize)]
struct ApiSearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'static str,
    include_answer: bool,
    topic: &'static str,
    include_raw_content: bool,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct ApiSearchResponse {
    #[serde(default)]
    results: Vec<ApiSearchResult>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}
