use serde_json::Value;

use super::literal::parse_literal;
use super::{TreatmentPlan, TreatmentPlanEntry};

/// Phrases the RAG service emits when it could not produce a plan.
const FAILURE_MARKERS: [&str; 2] = ["No plan was generated", "Failed to generate"];

/// Headings containing this phrase introduce the plan rather than a condition.
const PREAMBLE_HEADING: &str = "Preliminary Treatment Plan";

const BOLD_DELIMITER: &str = "**";
const BULLET_DELIMITER: char = '*';

/// Parse a RAG plan answer into normalized entries. Total: malformed input
/// yields a partial or empty plan, never an error.
pub fn parse_treatment_plan(text: &str) -> TreatmentPlan {
    if FAILURE_MARKERS.iter().any(|marker| text.contains(marker)) {
        tracing::info!("RAG answer reports no plan");
        return Vec::new();
    }

    match parse_literal(text) {
        Ok(Value::Array(records)) if records.iter().all(Value::is_object) => {
            tracing::debug!(records = records.len(), "Plan decoded as structured literal");
            return normalize_records(&records);
        }
        Ok(_) => tracing::debug!("Literal is not a list of records, using markdown parser"),
        Err(e) => tracing::debug!(error = %e, "Literal decode failed, using markdown parser"),
    }

    parse_markdown_plan(text)
}

/// Bold-delimited headings alternating with bullet bodies.
///
/// Trailing segments without a complete heading/body pair are ignored.
pub fn parse_markdown_plan(text: &str) -> TreatmentPlan {
    let parts: Vec<&str> = text.split(BOLD_DELIMITER).collect();
    let mut plan = Vec::new();

    let mut i = 1;
    while i + 1 < parts.len() {
        let heading = parts[i].replace(':', "");
        let heading = heading.trim();
        let body = parts[i + 1];
        i += 2;

        if heading.is_empty() || heading.contains(PREAMBLE_HEADING) {
            continue;
        }

        let details: Vec<String> = body
            .trim()
            .split(BULLET_DELIMITER)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();

        if !details.is_empty() {
            plan.push(TreatmentPlanEntry {
                condition: heading.to_string(),
                details,
            });
        }
    }

    tracing::debug!(entries = plan.len(), "Markdown plan parsed");
    plan
}

/// Normalize decoded `{condition, details}` mappings. Non-mapping items and
/// entries without a condition or any detail are dropped.
pub fn normalize_records(records: &[Value]) -> TreatmentPlan {
    records
        .iter()
        .filter_map(|record| {
            let record = record.as_object()?;
            let condition = scalar_text(record.get("condition")?)?;

            let details: Vec<String> = match record.get("details") {
                Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
                Some(single) => scalar_text(single).into_iter().collect(),
                None => Vec::new(),
            };

            if details.is_empty() {
                tracing::debug!(condition = %condition, "Dropping plan entry without details");
                return None;
            }
            Some(TreatmentPlanEntry { condition, details })
        })
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Render a plan in the markdown shape [`parse_markdown_plan`] reads.
///
/// Parsing the output gives the plan back only when no condition contains
/// `:` or `**` and no detail contains `*`. The markdown reader removes every
/// colon from headings and splits details on every asterisk.
pub fn render_as_markdown(plan: &[TreatmentPlanEntry]) -> String {
    let mut out = String::new();
    for entry in plan {
        out.push_str(&format!("{BOLD_DELIMITER}{}:{BOLD_DELIMITER}\n", entry.condition));
        for detail in &entry.details {
            out.push_str(&format!("{BULLET_DELIMITER} {detail}\n"));
        }
        out.push('\n');
    }
    out
}
