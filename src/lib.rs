pub mod api; // Web pages, routes and server lifecycle
pub mod artifact; // One-shot plan hand-off between requests
pub mod conditions; // Condition extraction from patient records
pub mod config;
pub mod education; // LLM explanation + PDF rendering
pub mod patients;
pub mod plan; // Treatment plan model and RAG answer parsing
pub mod rag;
pub mod research; // Literature search, retry and research files
pub mod workflow;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::workflow::{CareWorkflow, WorkflowError};

#[derive(Error, Debug)]
pub enum CareError {
    #[error("Startup failed: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    Server(#[from] api::ServerError),
}

/// Start the clinical assistant and serve until Ctrl+C.
///
/// The HTTP clients are blocking, so the workflow is built and dropped
/// outside the async runtime.
pub fn run() -> Result<(), CareError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env();
    tracing::info!(
        patient_dir = %config.patient_dir.display(),
        tmp_dir = %config.tmp_dir.display(),
        rag_url = %config.rag_url,
        "Configuration loaded"
    );

    let workflow = Arc::new(CareWorkflow::from_config(&config)?);

    // Plans nobody downloaded within the TTL
    let purged = workflow.artifacts().purge_stale(config.artifact_ttl);
    if purged > 0 {
        tracing::info!(purged, "Removed stale plan artifacts");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CareError::Runtime)?;
    let served = runtime.block_on(api::serve(workflow.clone(), &config.bind_addr));
    drop(runtime);
    drop(workflow);

    served?;
    Ok(())
}
