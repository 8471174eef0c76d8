pub mod literal;
pub mod parser;

pub use literal::*;
pub use parser::*;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One condition of a treatment plan with its recommendations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentPlanEntry {
    pub condition: String,
    pub details: Vec<String>,
}

/// Ordered treatment plan. Every entry has a non-empty condition and at
/// least one non-empty detail.
pub type TreatmentPlan = Vec<TreatmentPlanEntry>;

/// The `response` field of a RAG answer, in either of its shapes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RagAnswer {
    /// Markdown-ish or literal-encoded plan text.
    Text(String),
    /// Already-structured `{condition, details}` records.
    Structured(Vec<Value>),
    /// Anything else the service might send back.
    Other(Value),
}

impl RagAnswer {
    /// Resolve either shape into a normalized plan.
    pub fn into_plan(self) -> TreatmentPlan {
        match self {
            RagAnswer::Text(text) => parse_treatment_plan(&text),
            RagAnswer::Structured(records) => normalize_records(&records),
            RagAnswer::Other(value) => {
                tracing::warn!(kind = json_kind(&value), "Unsupported RAG answer shape");
                Vec::new()
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
