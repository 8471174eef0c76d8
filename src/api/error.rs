//! API errors rendered as HTML error pages.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use crate::api::pages::render_error_page;
use crate::artifact::ArtifactError;
use crate::patients::PatientError;
use crate::workflow::WorkflowError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// `(status, code, client message)` for this error.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                "An unexpected error occurred. Please try again.".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(detail = %detail, "Request failed with internal error");
        }
        let (status, code, message) = self.parts();
        (status, Html(render_error_page(code, &message))).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Patient(PatientError::InvalidId(_)) => {
                ApiError::BadRequest("Invalid patient id.".into())
            }
            WorkflowError::Patient(PatientError::NotFound(id)) => {
                ApiError::NotFound(format!("No record found for patient {id}."))
            }
            WorkflowError::Artifact(ArtifactError::InvalidPath(_))
            | WorkflowError::Artifact(ArtifactError::InvalidPatientId(_)) => {
                ApiError::BadRequest("Invalid file path provided.".into())
            }
            WorkflowError::Artifact(ArtifactError::NotFound(_)) => {
                ApiError::NotFound("Plan file not found. Please generate the plan again.".into())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PatientError> for ApiError {
    fn from(err: PatientError) -> Self {
        WorkflowError::from(err).into()
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("blocking task failed: {err}"))
    }
}
