//! Landing page with the patient picker.

use axum::extract::State;
use axum::response::Html;

use crate::api::error::ApiError;
use crate::api::pages::render_index_page;
use crate::api::types::ApiContext;

/// `GET /`
pub async fn index(State(ctx): State<ApiContext>) -> Result<Html<String>, ApiError> {
    let workflow = ctx.workflow.clone();
    let patients = tokio::task::spawn_blocking(move || workflow.patients().list_patients()).await??;
    Ok(Html(render_index_page(&patients)))
}
