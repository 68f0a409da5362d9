use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::gateway::{Gateway, GatewayError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayCall {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Default)]
pub struct MockGateway {
    responses: Mutex<VecDeque<Result<String, GatewayError>>>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, resp: Result<String, GatewayError>) {
        self.responses.lock().unwrap().push_back(resp);
    }

    pub fn push_text(&self, text: &str) {
        self.push_response(Ok(text.to_string()));
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn generate(&self, system: &str, user: &str) -> Result<String, GatewayError> {
        self.calls.lock().unwrap().push(GatewayCall {
            system: system.to_string(),
            user: user.to_string(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::MockQueueEmpty))
    }
}
