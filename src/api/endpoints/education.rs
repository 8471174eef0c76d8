//! Patient education PDF download.

use std::path::PathBuf;

use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::education::PDF_FILENAME;

#[derive(Debug, Deserialize)]
pub struct EducationForm {
    #[serde(default)]
    pub plan_file_path: String,
}

/// `POST /generate-education-material`
///
/// The plan artifact is consumed by this call; a second download of the
/// same plan gets a 404.
pub async fn download(
    State(ctx): State<ApiContext>,
    Form(form): Form<EducationForm>,
) -> Result<Response, ApiError> {
    let location = form.plan_file_path.trim();
    if location.is_empty() {
        return Err(ApiError::BadRequest("Invalid file path provided.".into()));
    }
    let location = PathBuf::from(location);

    let workflow = ctx.workflow.clone();
    let pdf = tokio::task::spawn_blocking(move || workflow.generate_education(&location))
        .await?
        .map_err(ApiError::from)?;

    Ok((
        [
            (CONTENT_TYPE, "application/pdf".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{PDF_FILENAME}\""),
            ),
        ],
        pdf,
    )
        .into_response())
}
