//! Treatment plan generation.

use axum::extract::State;
use axum::response::Html;
use axum::Form;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::pages::render_plan_page;
use crate::api::types::ApiContext;

#[derive(Debug, Deserialize)]
pub struct PlanForm {
    pub patient_id: String,
}

/// `POST /generate-plan`
///
/// Research, indexing wait and the RAG call are all blocking and can take
/// minutes, so the whole request runs on the blocking pool.
pub async fn generate(
    State(ctx): State<ApiContext>,
    Form(form): Form<PlanForm>,
) -> Result<Html<String>, ApiError> {
    let patient_id = form.patient_id.trim().to_string();
    if patient_id.is_empty() {
        return Err(ApiError::BadRequest("Please select a patient.".into()));
    }

    let workflow = ctx.workflow.clone();
    let (patients, outcome) = tokio::task::spawn_blocking(move || {
        let outcome = workflow.generate_plan(&patient_id)?;
        let patients = workflow.patients().list_patients()?;
        Ok::<_, ApiError>((patients, outcome))
    })
    .await??;

    Ok(Html(render_plan_page(&patients, &outcome)))
}
