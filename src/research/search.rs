use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;

use super::{ResearchError, SearchError};

/// Fields requested from the search API.
const SEARCH_FIELDS: &str = "title,abstract";

/// Per-request timeout for the literature search.
pub const SEARCH_TIMEOUT_SECS: u64 = 15;

/// One paper returned by the search API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Paper {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
}

impl Paper {
    pub fn new(title: &str, abstract_text: Option<&str>) -> Self {
        Self {
            title: Some(title.to_string()),
            abstract_text: abstract_text.map(str::to_string),
        }
    }
}

/// Literature search abstraction (allows mocking).
pub trait SearchClient: Send + Sync {
    /// Run a single search request. No retries at this level.
    fn search(&self, query: &str) -> Result<Vec<Paper>, SearchError>;
}

impl<T: SearchClient + ?Sized> SearchClient for Arc<T> {
    fn search(&self, query: &str) -> Result<Vec<Paper>, SearchError> {
        (**self).search(query)
    }
}

/// Response body of the paper search endpoint.
#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<Vec<Option<Paper>>>,
}

/// Semantic Scholar paper search over blocking HTTP.
pub struct SemanticScholarClient {
    url: String,
    limit: u32,
    client: reqwest::blocking::Client,
}

impl SemanticScholarClient {
    pub fn new(url: &str, limit: u32) -> Result<Self, ResearchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| ResearchError::HttpClient(e.to_string()))?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            limit,
            client,
        })
    }
}

impl SearchClient for SemanticScholarClient {
    fn search(&self, query: &str) -> Result<Vec<Paper>, SearchError> {
        let limit = self.limit.to_string();
        let response = self
            .client
            .get(&self.url)
            .query(&[("query", query), ("limit", limit.as_str()), ("fields", SEARCH_FIELDS)])
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Transport(format!(
                        "Request timed out after {SEARCH_TIMEOUT_SECS}s"
                    ))
                } else {
                    SearchError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response
            .json()
            .map_err(|e| SearchError::ResponseParsing(e.to_string()))?;

        Ok(parsed.data.unwrap_or_default().into_iter().flatten().collect())
    }
}

/// Mock search client for testing. Replays scripted outcomes in order
/// and records every query. Returns an empty result once the script runs out.
pub struct MockSearchClient {
    script: Mutex<VecDeque<Result<Vec<Paper>, SearchError>>>,
    queries: Mutex<Vec<String>>,
}

impl MockSearchClient {
    pub fn new(script: Vec<Result<Vec<Paper>, SearchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

impl SearchClient for MockSearchClient {
    fn search(&self, query: &str) -> Result<Vec<Paper>, SearchError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
