//! Reference retrieval: fetch a handful of fresh documents about a topic from a
//! web-search provider so the composer can ground the copy in current material.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod tavily;

pub use tavily::TavilySearch;

#[cfg(test)]
pub mod mock;

/// Upper bound on documents handed to the composer per request.
pub const MAX_REFERENCES: usize = 3;

/// One retrieved document. Lives only for the duration of a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDocument {
    pub source_url: String,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("search query is empty")]
    EmptyQuery,
    #[error("search provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("search response could not be decoded: {0}")]
    Malformed(String),
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// At most [`MAX_REFERENCES`] documents, in provider order.
    async fn search(&self, topic: &str) -> Result<Vec<ReferenceDocument>, RetrievalError>;
}
