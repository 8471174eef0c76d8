use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::retry::{RetryPolicy, Sleeper};
use super::search::{Paper, SearchClient};
use super::{ResearchDocument, ResearchError, SearchError};
use crate::conditions::{extract_conditions, unique_conditions};

/// Maximum length (in characters) of a research file stem.
pub const MAX_SLUG_CHARS: usize = 60;

const UNTITLED_PAPER: &str = "Untitled Paper";
const UNTITLED_SLUG: &str = "Untitled_Paper";

/// Pause between consecutive conditions to respect the search API rate limit.
pub const POLITENESS_DELAY: Duration = Duration::from_secs(1);

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid slug regex"));

/// Fetches research abstracts for a patient's conditions and stores them
/// as text files in the research directory indexed by the RAG service.
///
/// Search failures never abort the batch: a condition whose searches all
/// fail simply contributes no documents.
pub struct ResearchFetcher {
    search: Box<dyn SearchClient>,
    sleeper: Box<dyn Sleeper>,
    research_dir: PathBuf,
    retry: RetryPolicy,
    politeness_delay: Duration,
}

impl ResearchFetcher {
    pub fn new(
        search: Box<dyn SearchClient>,
        sleeper: Box<dyn Sleeper>,
        research_dir: &Path,
    ) -> Self {
        Self {
            search,
            sleeper,
            research_dir: research_dir.to_path_buf(),
            retry: RetryPolicy::default(),
            politeness_delay: POLITENESS_DELAY,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn research_dir(&self) -> &Path {
        &self.research_dir
    }

    /// Extract conditions from a patient record and fetch papers for each.
    pub fn fetch_and_save(&self, patient_text: &str) -> Result<Vec<ResearchDocument>, ResearchError> {
        let conditions = extract_conditions(patient_text);
        self.fetch_for_conditions(&conditions)
    }

    /// Fetch papers for each unique condition. Duplicates in the input are
    /// searched once.
    pub fn fetch_for_conditions<S: AsRef<str>>(
        &self,
        conditions: &[S],
    ) -> Result<Vec<ResearchDocument>, ResearchError> {
        let unique = unique_conditions(conditions);

        std::fs::create_dir_all(&self.research_dir).map_err(|source| ResearchError::Directory {
            path: self.research_dir.clone(),
            source,
        })?;

        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut created = Vec::new();

        for (index, condition) in unique.iter().enumerate() {
            if index > 0 {
                self.sleeper.sleep(self.politeness_delay);
            }

            let specific = format!("treatment and management of {condition}");
            tracing::info!(condition = %condition, query = %specific, "Searching research");
            let mut documents = self.perform_search(&specific, condition);

            if documents.is_empty() {
                tracing::info!(condition = %condition, "Fallback search with bare condition");
                documents = self.perform_search(condition, condition);
            }

            if documents.is_empty() {
                tracing::info!(
                    condition = %condition,
                    "No papers with abstracts found after all attempts"
                );
                continue;
            }

            tracing::info!(condition = %condition, count = documents.len(), "Papers saved");
            for doc in documents {
                if seen.insert(doc.location.clone()) {
                    created.push(doc);
                }
            }
        }

        tracing::info!(total = created.len(), "Research fetch complete");
        Ok(created)
    }

    /// One query under the retry policy. Exhausted retries yield no documents.
    fn perform_search(&self, query: &str, condition: &str) -> Vec<ResearchDocument> {
        for attempt in 0..self.retry.max_attempts {
            match self.search.search(query) {
                Ok(papers) => return self.save_papers(papers),
                Err(SearchError::RateLimited) => {
                    if self.retry.has_next(attempt) {
                        let wait = self.retry.backoff(attempt);
                        tracing::warn!(
                            condition = %condition,
                            attempt = attempt + 1,
                            wait_secs = wait.as_secs_f32(),
                            "Search rate limited, backing off"
                        );
                        self.sleeper.sleep(wait);
                    } else {
                        tracing::warn!(
                            condition = %condition,
                            attempt = attempt + 1,
                            "Search rate limited on final attempt"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        condition = %condition,
                        attempt = attempt + 1,
                        error = %e,
                        "Search request failed"
                    );
                    if self.retry.has_next(attempt) {
                        self.sleeper.sleep(self.retry.backoff(attempt));
                    }
                }
            }
        }

        tracing::warn!(condition = %condition, query, "All search attempts failed");
        Vec::new()
    }

    /// Persist every paper that carries an abstract.
    fn save_papers(&self, papers: Vec<Paper>) -> Vec<ResearchDocument> {
        let mut saved = Vec::new();

        for paper in papers {
            let Some(abstract_text) = paper
                .abstract_text
                .as_deref()
                .filter(|a| !a.trim().is_empty())
            else {
                continue;
            };
            let title = paper
                .title
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(UNTITLED_PAPER);

            let document_id = slugify_title(title);
            let location = self.research_dir.join(format!("{document_id}.txt"));
            let content = format!("Title: {title}\n\nAbstract: {abstract_text}");

            match std::fs::write(&location, content) {
                Ok(()) => saved.push(ResearchDocument {
                    document_id,
                    title: title.to_string(),
                    location,
                }),
                Err(e) => {
                    tracing::warn!(path = %location.display(), "Failed to save research file: {e}");
                }
            }
        }

        saved
    }

    /// Remove research files created by a request. Never fails: missing
    /// files and permission errors are logged and skipped.
    pub fn cleanup<I, P>(&self, locations: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        cleanup_files(locations);
    }
}

/// Delete each file, logging failures instead of returning them.
pub fn cleanup_files<I, P>(locations: I)
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut removed = 0usize;

    for location in locations {
        let path = location.as_ref();
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Research file already removed");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Error cleaning up research file: {e}");
            }
        }
    }

    tracing::info!(removed, "Research cleanup complete");
}

/// File-safe slug of a paper title: punctuation removed, whitespace to
/// underscores, capped at [`MAX_SLUG_CHARS`] characters.
pub fn slugify_title(title: &str) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(title, "");
    let slug: String = cleaned
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .take(MAX_SLUG_CHARS)
        .collect();

    if slug.is_empty() {
        UNTITLED_SLUG.to_string()
    } else {
        slug
    }
}
