//! Patient education material: an LLM explanation of the plan, rendered
//! to PDF.

pub mod pdf;
pub mod prompt;

pub use pdf::*;
pub use prompt::*;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::TreatmentPlanEntry;

/// Per-request timeout for the completion call.
pub const LLM_TIMEOUT_SECS: u64 = 120;

/// Substituted when the LLM cannot produce an explanation.
pub const FALLBACK_EXPLANATION: &str = "There was an error generating the detailed explanation \
     for your treatment plan. Please consult your doctor directly.";

#[derive(Error, Debug)]
pub enum EducationError {
    #[error("Cannot connect to LLM provider at {0}")]
    Connection(String),

    #[error("LLM provider returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed completion response: {0}")]
    ResponseParsing(String),

    #[error("Completion contained no text")]
    EmptyCompletion,

    #[error("PDF rendering failed: {0}")]
    Pdf(String),
}

/// Single-shot text completion (allows mocking).
pub trait LlmClient: Send + Sync {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, EducationError>;
}

impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, EducationError> {
        (**self).generate(model, prompt)
    }
}

/// OpenAI-compatible `/chat/completions` client.
pub struct ChatCompletionClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl ChatCompletionClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, EducationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(LLM_TIMEOUT_SECS))
            .build()
            .map_err(|e| EducationError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient for ChatCompletionClient {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, EducationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_connect() {
                EducationError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                EducationError::HttpClient(format!(
                    "Request timed out after {LLM_TIMEOUT_SECS}s"
                ))
            } else {
                EducationError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EducationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| EducationError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(EducationError::EmptyCompletion)
    }
}

/// Mock LLM client for testing: a fixed response or a connection failure.
/// Records every prompt it receives.
pub struct MockLlmClient {
    response: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            response: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, prompt: &str) -> Result<String, EducationError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.response
            .clone()
            .ok_or_else(|| EducationError::Connection("mock".into()))
    }
}

/// Turns a plan into a patient-facing explanation and PDF.
pub struct EducationMaterialGenerator {
    llm: Box<dyn LlmClient>,
    model: String,
}

impl EducationMaterialGenerator {
    pub fn new(llm: Box<dyn LlmClient>, model: &str) -> Self {
        Self {
            llm,
            model: model.to_string(),
        }
    }

    /// Explanation text. Never fails: any LLM error yields
    /// [`FALLBACK_EXPLANATION`].
    pub fn explain(&self, plan: &[TreatmentPlanEntry]) -> String {
        let prompt = build_education_prompt(plan);
        tracing::info!(model = %self.model, entries = plan.len(), "Requesting plan explanation");

        match self.llm.generate(&self.model, &prompt) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!("LLM returned an empty explanation, using fallback");
                FALLBACK_EXPLANATION.to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM explanation failed, using fallback");
                FALLBACK_EXPLANATION.to_string()
            }
        }
    }

    /// Explain the plan and render the explanation as PDF bytes.
    pub fn generate_pdf(&self, plan: &[TreatmentPlanEntry]) -> Result<Vec<u8>, EducationError> {
        let explanation = self.explain(plan);
        let bytes = render_education_pdf(&explanation)?;
        tracing::info!(bytes = bytes.len(), "Education PDF rendered");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> Vec<TreatmentPlanEntry> {
        vec![TreatmentPlanEntry {
            condition: "Hypertension".into(),
            details: vec!["Reduce sodium".into()],
        }]
    }

    #[test]
    fn explanation_comes_from_llm() {
        let llm = Arc::new(MockLlmClient::new("**High blood pressure** means..."));
        let generator = EducationMaterialGenerator::new(Box::new(llm.clone()), "m");

        assert_eq!(generator.explain(&plan()), "**High blood pressure** means...");
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- Condition: Hypertension"));
    }

    #[test]
    fn llm_failure_uses_fallback() {
        let generator = EducationMaterialGenerator::new(Box::new(MockLlmClient::unreachable()), "m");
        assert_eq!(generator.explain(&plan()), FALLBACK_EXPLANATION);
    }

    #[test]
    fn blank_completion_uses_fallback() {
        let generator = EducationMaterialGenerator::new(Box::new(MockLlmClient::new("  \n")), "m");
        assert_eq!(generator.explain(&plan()), FALLBACK_EXPLANATION);
    }

    #[test]
    fn pdf_generated_even_when_llm_down() {
        let generator = EducationMaterialGenerator::new(Box::new(MockLlmClient::unreachable()), "m");
        let bytes = generator.generate_pdf(&plan()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn chat_client_trims_url_and_ignores_blank_key() {
        let client = ChatCompletionClient::new("https://llm.example/v1/", Some("  ".into())).unwrap();
        assert_eq!(client.base_url, "https://llm.example/v1");
        assert!(client.api_key.is_none());
    }

    #[test]
    fn chat_request_shape() {
        let body = ChatRequest {
            model: "meta-llama/Meta-Llama-3-70B-Instruct",
            messages: [ChatMessage {
                role: "user",
                content: "hello",
            }],
            stream: false,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "model": "meta-llama/Meta-Llama-3-70B-Instruct",
                "messages": [{"role": "user", "content": "hello"}],
                "stream": false
            })
        );
    }

    #[test]
    fn chat_response_content_extracted() {
        let raw = r#"{"id": "x", "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Hi"));
    }

    #[test]
    fn fallback_text_is_patient_facing() {
        assert!(FALLBACK_EXPLANATION.starts_with("There was an error generating"));
        assert!(FALLBACK_EXPLANATION.ends_with("Please consult your doctor directly."));
        assert!(!FALLBACK_EXPLANATION.contains("  "));
    }
}
