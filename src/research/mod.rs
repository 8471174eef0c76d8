pub mod fetcher;
pub mod retry;
pub mod search;

pub use fetcher::*;
pub use retry::*;
pub use search::*;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A persisted research abstract, owned by the request that fetched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchDocument {
    /// Sanitized title slug, also the file stem.
    pub document_id: String,
    pub title: String,
    pub location: PathBuf,
}

/// Failure of a single literature search request.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search API rate limit hit (HTTP 429)")]
    RateLimited,

    #[error("Search API returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Search request failed: {0}")]
    Transport(String),

    #[error("Malformed search response: {0}")]
    ResponseParsing(String),
}

#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Failed to create research directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}
