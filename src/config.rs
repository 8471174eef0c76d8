use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "CARE";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default RAG answer endpoint (local RAG server).
pub const DEFAULT_RAG_URL: &str = "http://localhost:8001/v2/answer";

/// Default literature search endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";

/// Default OpenAI-compatible completion endpoint for patient education.
pub const DEFAULT_LLM_URL: &str = "https://router.huggingface.co/v1";

pub const DEFAULT_LLM_MODEL: &str = "meta-llama/Meta-Llama-3-70B-Instruct";

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "care=info,care_lib=info,tower_http=warn"
}

/// Get the default data directory: ~/Care/ (falls back to ./Care).
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Care")
}

/// Runtime configuration, built once at startup and handed to each
/// component at construction.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Processed patient records (`<patient_id>.txt`).
    pub patient_dir: PathBuf,
    /// Scratch directory for research abstracts indexed by the RAG server.
    pub research_dir: PathBuf,
    /// Root of the plan artifact sandbox.
    pub tmp_dir: PathBuf,
    pub rag_url: String,
    pub search_url: String,
    pub search_limit: u32,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub bind_addr: String,
    /// Delay between saving research files and querying the RAG server.
    pub index_wait: Duration,
    /// Plan artifacts older than this are purged at startup.
    pub artifact_ttl: Duration,
}

impl AppConfig {
    /// Configuration rooted at `data_dir` with every other value defaulted.
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            patient_dir: data_dir.join("processed").join("patient_text"),
            research_dir: data_dir.join("processed").join("research"),
            tmp_dir: data_dir.join("tmp"),
            rag_url: DEFAULT_RAG_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            search_limit: 5,
            llm_url: DEFAULT_LLM_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_api_key: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            index_wait: Duration::from_secs(23),
            artifact_ttl: Duration::from_secs(3600),
        }
    }

    /// Read configuration from the process environment (and `.env`).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = get("CARE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let mut config = Self::with_data_dir(&data_dir);

        if let Some(v) = get("CARE_PATIENT_DIR") {
            config.patient_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CARE_RESEARCH_DIR") {
            config.research_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CARE_TMP_DIR") {
            config.tmp_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CARE_RAG_URL") {
            config.rag_url = v;
        }
        if let Some(v) = get("CARE_SEARCH_URL") {
            config.search_url = v;
        }
        if let Some(v) = get("CARE_SEARCH_LIMIT") {
            match v.parse() {
                Ok(limit) => config.search_limit = limit,
                Err(_) => tracing::warn!(value = %v, "Ignoring invalid CARE_SEARCH_LIMIT"),
            }
        }
        if let Some(v) = get("CARE_LLM_URL") {
            config.llm_url = v;
        }
        if let Some(v) = get("CARE_LLM_MODEL") {
            config.llm_model = v;
        }
        config.llm_api_key = get("HF_API_TOKEN");
        if let Some(v) = get("CARE_BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Some(secs) = parse_secs(get("CARE_INDEX_WAIT_SECS"), "CARE_INDEX_WAIT_SECS") {
            config.index_wait = secs;
        }
        if let Some(secs) = parse_secs(get("CARE_ARTIFACT_TTL_SECS"), "CARE_ARTIFACT_TTL_SECS") {
            config.artifact_ttl = secs;
        }

        config
    }
}

fn parse_secs(value: Option<String>, key: &str) -> Option<Duration> {
    let value = value?;
    match value.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            tracing::warn!(key, value = %value, "Ignoring invalid duration");
            None
        }
    }
}
