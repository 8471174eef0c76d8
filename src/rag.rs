//! Client for the external RAG answering service.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::plan::RagAnswer;

/// The service indexes and answers synchronously; answers can take minutes.
pub const RAG_TIMEOUT_SECS: u64 = 180;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Cannot connect to RAG service at {0}")]
    Connection(String),

    #[error("RAG request timed out after {0}s")]
    Timeout(u64),

    #[error("RAG service returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed RAG response: {0}")]
    ResponseParsing(String),
}

/// RAG answering abstraction (allows mocking).
pub trait RagClient: Send + Sync {
    fn answer(&self, prompt: &str) -> Result<RagAnswer, RagError>;
}

impl<T: RagClient + ?Sized> RagClient for Arc<T> {
    fn answer(&self, prompt: &str) -> Result<RagAnswer, RagError> {
        (**self).answer(prompt)
    }
}

#[derive(Serialize)]
struct AnswerRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct AnswerResponse {
    #[serde(default)]
    response: Option<RagAnswer>,
}

impl AnswerResponse {
    fn into_answer(self) -> RagAnswer {
        self.response.unwrap_or(RagAnswer::Other(Value::Null))
    }
}

pub struct HttpRagClient {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpRagClient {
    pub fn new(url: &str) -> Result<Self, RagError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(RAG_TIMEOUT_SECS))
            .build()
            .map_err(|e| RagError::HttpClient(e.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

impl RagClient for HttpRagClient {
    fn answer(&self, prompt: &str) -> Result<RagAnswer, RagError> {
        let response = self
            .client
            .post(&self.url)
            .json(&AnswerRequest { prompt })
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    RagError::Connection(self.url.clone())
                } else if e.is_timeout() {
                    RagError::Timeout(RAG_TIMEOUT_SECS)
                } else {
                    RagError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RagError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AnswerResponse = response
            .json()
            .map_err(|e| RagError::ResponseParsing(e.to_string()))?;
        Ok(parsed.into_answer())
    }
}

/// Mock RAG client for testing: a fixed answer or a connection failure.
/// Records every prompt.
pub struct MockRagClient {
    answer: Option<RagAnswer>,
    prompts: Mutex<Vec<String>>,
}

impl MockRagClient {
    pub fn new(answer: RagAnswer) -> Self {
        Self {
            answer: Some(answer),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers with plan text.
    pub fn with_text(text: &str) -> Self {
        Self::new(RagAnswer::Text(text.to_string()))
    }

    pub fn unreachable() -> Self {
        Self {
            answer: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl RagClient for MockRagClient {
    fn answer(&self, prompt: &str) -> Result<RagAnswer, RagError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.answer
            .clone()
            .ok_or_else(|| RagError::Connection("mock".into()))
    }
}
