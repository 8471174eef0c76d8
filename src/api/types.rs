//! Shared state for the web router.

use std::sync::Arc;

use crate::workflow::CareWorkflow;

/// Cloned into every handler and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub workflow: Arc<CareWorkflow>,
}

impl ApiContext {
    pub fn new(workflow: Arc<CareWorkflow>) -> Self {
        Self { workflow }
    }
}
