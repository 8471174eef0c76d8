//! Request-level orchestration.
//!
//! Plan request: patient record → research fetch → indexing wait → keyword
//! prompt → RAG answer → normalized plan → stored artifact. Research files
//! are removed when the request ends, whatever happened in between.
//!
//! Education request: consume the artifact once → LLM explanation → PDF.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::artifact::{ArtifactBroker, ArtifactError};
use crate::conditions::{extract_conditions, keyword_prompt};
use crate::config::AppConfig;
use crate::education::{ChatCompletionClient, EducationError, EducationMaterialGenerator};
use crate::patients::{PatientError, PatientStore};
use crate::plan::TreatmentPlan;
use crate::rag::{HttpRagClient, RagClient, RagError};
use crate::research::{
    ResearchDocument, ResearchError, ResearchFetcher, SemanticScholarClient, Sleeper,
    ThreadSleeper,
};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Patient(#[from] PatientError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Education(#[from] EducationError),

    #[error(transparent)]
    Research(#[from] ResearchError),

    #[error(transparent)]
    Rag(#[from] RagError),
}

/// Everything the plan page shows. `error` carries a readable message when
/// an upstream step failed; the rest is still rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub patient_id: String,
    pub patient_info: String,
    pub plan: TreatmentPlan,
    /// Artifact to hand to the education request. `None` means nothing to
    /// download.
    pub plan_location: Option<PathBuf>,
    pub error: Option<String>,
}

pub struct CareWorkflow {
    patients: PatientStore,
    fetcher: ResearchFetcher,
    rag: Box<dyn RagClient>,
    artifacts: ArtifactBroker,
    education: EducationMaterialGenerator,
    index_wait: Duration,
    waiter: Box<dyn Sleeper>,
}

impl CareWorkflow {
    pub fn new(
        patients: PatientStore,
        fetcher: ResearchFetcher,
        rag: Box<dyn RagClient>,
        artifacts: ArtifactBroker,
        education: EducationMaterialGenerator,
    ) -> Self {
        Self {
            patients,
            fetcher,
            rag,
            artifacts,
            education,
            index_wait: Duration::ZERO,
            waiter: Box::new(ThreadSleeper),
        }
    }

    /// Pause after fetching research so the RAG service can index it.
    pub fn with_index_wait(mut self, wait: Duration, waiter: Box<dyn Sleeper>) -> Self {
        self.index_wait = wait;
        self.waiter = waiter;
        self
    }

    /// Wire the production HTTP clients from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, WorkflowError> {
        let search = SemanticScholarClient::new(&config.search_url, config.search_limit)?;
        let fetcher = ResearchFetcher::new(
            Box::new(search),
            Box::new(ThreadSleeper),
            &config.research_dir,
        );
        let rag = HttpRagClient::new(&config.rag_url)?;
        let llm = ChatCompletionClient::new(&config.llm_url, config.llm_api_key.clone())?;
        let artifacts = ArtifactBroker::new(&config.tmp_dir)?;

        Ok(Self::new(
            PatientStore::new(&config.patient_dir),
            fetcher,
            Box::new(rag),
            artifacts,
            EducationMaterialGenerator::new(Box::new(llm), &config.llm_model),
        )
        .with_index_wait(config.index_wait, Box::new(ThreadSleeper)))
    }

    pub fn patients(&self) -> &PatientStore {
        &self.patients
    }

    pub fn artifacts(&self) -> &ArtifactBroker {
        &self.artifacts
    }

    /// Run the plan request for one patient. Only an unreadable patient
    /// record is an error; upstream failures land in [`PlanOutcome::error`].
    pub fn generate_plan(&self, patient_id: &str) -> Result<PlanOutcome, WorkflowError> {
        let patient_info = self.patients.read_patient(patient_id)?;
        tracing::info!(patient_id, "Generating treatment plan");

        let mut outcome = PlanOutcome {
            patient_id: patient_id.to_string(),
            patient_info,
            plan: Vec::new(),
            plan_location: None,
            error: None,
        };

        let mut scratch = ResearchScratch {
            fetcher: &self.fetcher,
            documents: Vec::new(),
        };
        self.draft_plan(&mut outcome, &mut scratch);
        drop(scratch);

        if let Some(error) = &outcome.error {
            tracing::warn!(patient_id, error = %error, "Plan generation incomplete");
        }
        Ok(outcome)
    }

    fn draft_plan(&self, outcome: &mut PlanOutcome, scratch: &mut ResearchScratch<'_>) {
        match self.fetcher.fetch_and_save(&outcome.patient_info) {
            Ok(documents) => scratch.documents = documents,
            Err(e) => {
                outcome.error = Some(format!("Could not prepare research files: {e}"));
                return;
            }
        }

        if !scratch.documents.is_empty() && !self.index_wait.is_zero() {
            tracing::info!(
                wait_secs = self.index_wait.as_secs(),
                documents = scratch.documents.len(),
                "Waiting for RAG service to index new research"
            );
            self.waiter.sleep(self.index_wait);
        }

        let prompt = keyword_prompt(&extract_conditions(&outcome.patient_info));
        tracing::info!(prompt = %prompt, "Querying RAG service");

        let answer = match self.rag.answer(&prompt) {
            Ok(answer) => answer,
            Err(e) => {
                outcome.error = Some(match e {
                    RagError::Connection(_) | RagError::Timeout(_) => format!(
                        "Could not connect to the RAG service. Is it running? Error: {e}"
                    ),
                    _ => format!("The RAG service could not generate a plan. Error: {e}"),
                });
                return;
            }
        };

        outcome.plan = answer.into_plan();
        tracing::info!(entries = outcome.plan.len(), "Treatment plan parsed");

        match self.artifacts.store(&outcome.patient_id, &outcome.plan) {
            Ok(location) => outcome.plan_location = location,
            Err(e) => {
                tracing::error!(error = %e, "Failed to store plan artifact");
                outcome.error = Some(
                    "The plan could not be saved for the education download. \
                     Please generate it again."
                        .to_string(),
                );
            }
        }
    }

    /// Run the education request: consume the plan artifact and render the
    /// explanation PDF.
    pub fn generate_education(&self, plan_location: &Path) -> Result<Vec<u8>, WorkflowError> {
        let plan = self.artifacts.retrieve_and_consume(plan_location)?;
        Ok(self.education.generate_pdf(&plan)?)
    }
}

/// Research files owned by one plan request, removed on drop.
struct ResearchScratch<'a> {
    fetcher: &'a ResearchFetcher,
    documents: Vec<ResearchDocument>,
}

impl Drop for ResearchScratch<'_> {
    fn drop(&mut self) {
        if self.documents.is_empty() {
            return;
        }
        tracing::info!(count = self.documents.len(), "Cleaning up research files");
        self.fetcher
            .cleanup(self.documents.iter().map(|doc| doc.location.as_path()));
    }
}
