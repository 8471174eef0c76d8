//! Web server lifecycle.
//!
//! bind → serve router → stop on shutdown signal (Ctrl+C in production,
//! a oneshot channel in tests).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::api::router::care_router;
use crate::workflow::CareWorkflow;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_on<F>(
    listener: TcpListener,
    workflow: Arc<CareWorkflow>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!(%addr, "Web server started");

    axum::serve(listener, care_router(workflow))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Web server stopped");
    Ok(())
}

/// Bind `bind_addr` and serve until Ctrl+C.
pub async fn serve(workflow: Arc<CareWorkflow>, bind_addr: &str) -> Result<(), ServerError> {
    let listener = bind(bind_addr).await?;
    serve_on(listener, workflow, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        tracing::info!("Shutdown signal received");
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactBroker;
    use crate::education::{EducationMaterialGenerator, MockLlmClient};
    use crate::patients::PatientStore;
    use crate::rag::MockRagClient;
    use crate::research::{MockSearchClient, RecordingSleeper, ResearchFetcher};
    use tokio::sync::oneshot;

    fn mock_workflow(dir: &std::path::Path) -> Arc<CareWorkflow> {
        let fetcher = ResearchFetcher::new(
            Box::new(MockSearchClient::new(Vec::new())),
            Box::new(RecordingSleeper::new()),
            &dir.join("research"),
        );
        Arc::new(CareWorkflow::new(
            PatientStore::new(&dir.join("patients")),
            fetcher,
            Box::new(MockRagClient::with_text("")),
            ArtifactBroker::new(&dir.join("tmp")).unwrap(),
            EducationMaterialGenerator::new(Box::new(MockLlmClient::new("ok")), "test-model"),
        ))
    }

    #[tokio::test]
    async fn serves_health_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let listener = bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_on(listener, mock_workflow(dir.path()), async {
            let _ = rx.await;
        }));

        let url = format!("http://127.0.0.1:{port}/health");
        let body: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body["status"], "ok");

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_failure_names_address() {
        let taken = bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let err = bind(&addr).await.unwrap_err();
        assert!(err.to_string().contains(&addr));
    }
}
