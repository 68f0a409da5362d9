use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ReferenceDocument, RetrievalError, SearchProvider};

/// Queued search results; an empty queue answers with no documents.
#[derive(Debug, Default)]
pub struct MockSearch {
    responses: Mutex<VecDeque<Result<Vec<ReferenceDocument>, RetrievalError>>>,
    calls: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, resp: Result<Vec<ReferenceDocument>, RetrievalError>) {
        self.responses.lock().unwrap().push_back(resp);
    }

    pub fn push_docs(&self, docs: &[(&str, &str)]) {
        let docs = docs
            .iter()
            .map(|(url, content)| ReferenceDocument {
                source_url: (*url).to_string(),
                content: (*content).to_string(),
            })
            .collect();
        self.push_response(Ok(docs));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, topic: &str) -> Result<Vec<ReferenceDocument>, RetrievalError> {
        self.calls.lock().unwrap().push(topic.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
