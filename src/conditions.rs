//! Condition extraction from processed patient records.
//!
//! Patient text files carry a `Conditions:` section. Only entries tagged
//! with the `(disorder)` marker are treated as diagnosed conditions.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Marker identifying diagnosed conditions in a patient record.
pub const DISORDER_MARKER: &str = "(disorder)";

/// Prompt sent to the RAG service when no condition survives sanitizing.
pub const NO_CONDITIONS_PROMPT: &str = "No conditions listed";

/// Span after `Conditions:` up to the next blank-line section label or end of text.
static CONDITIONS_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Conditions:(.*?)(?:\n\n[A-Z][a-z]+:|$)").expect("valid conditions regex")
});

static FRAGMENT_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n;]").expect("valid split regex"));

static NON_ALPHA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z\s]").expect("valid sanitize regex"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Extract disorder-marked conditions in source order.
///
/// Duplicates are kept; callers that need a set use [`unique_conditions`].
pub fn extract_conditions(patient_text: &str) -> Vec<String> {
    let Some(block) = CONDITIONS_BLOCK
        .captures(patient_text)
        .and_then(|caps| caps.get(1))
    else {
        tracing::debug!("No Conditions block in patient record");
        return Vec::new();
    };

    let conditions: Vec<String> = FRAGMENT_SPLIT
        .split(block.as_str())
        .filter(|fragment| fragment.contains(DISORDER_MARKER))
        .map(|fragment| {
            fragment
                .replace(DISORDER_MARKER, "")
                .trim_matches(|c: char| c == '-' || c == ' ')
                .trim()
                .to_string()
        })
        .filter(|condition| !condition.is_empty())
        .collect();

    tracing::debug!(count = conditions.len(), "Extracted conditions");
    conditions
}

/// Sorted, deduplicated, non-blank conditions.
pub fn unique_conditions<S: AsRef<str>>(conditions: &[S]) -> Vec<String> {
    conditions
        .iter()
        .map(|c| c.as_ref().trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Keyword-only RAG prompt: letters and spaces of each unique condition.
pub fn keyword_prompt<S: AsRef<str>>(conditions: &[S]) -> String {
    let keywords: Vec<String> = unique_conditions(conditions)
        .iter()
        .map(|c| NON_ALPHA.replace_all(c, "").trim().to_string())
        .filter(|c| !c.is_empty())
        .map(|c| WHITESPACE_RUN.replace_all(&c, " ").into_owned())
        .collect();

    if keywords.is_empty() {
        NO_CONDITIONS_PROMPT.to_string()
    } else {
        keywords.join(" ")
    }
}
