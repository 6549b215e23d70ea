//! OCR cleanup through an OpenAI-compatible chat completions endpoint.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::json;

use inkwell_core::config::OpenAiSettings;
use inkwell_sync::providers::CleanupProvider;
use inkwell_sync::ProviderError;

use super::http;

const SYSTEM_PROMPT: &str = "You clean OCR text with minimal rewriting. Preserve wording.";
const DEFAULT_INSTRUCTIONS: &str = "Clean this OCR text.";
const TEMPERATURE: f32 = 0.2;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiCleanup {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
    prompt_path: Option<PathBuf>,
}

impl OpenAiCleanup {
    pub fn new(settings: &OpenAiSettings, api_key: String, prompt_path: Option<PathBuf>) -> Self {
        OpenAiCleanup {
            agent: http::agent(settings.timeout_secs),
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key,
            prompt_path,
        }
    }

    /// The prompt file is re-read per call so edits apply mid-run.
    fn instructions(&self) -> String {
        self.prompt_path
            .as_deref()
            .and_then(|p| fs::read_to_string(p).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string())
    }
}

fn user_prompt(instructions: &str, text: &str) -> String {
    format!("{instructions}\n\nTEXT:\n{text}")
}

/// Cleaned text, or the input when the model returned nothing.
fn extract_text(response: ChatResponse, original: &str) -> String {
    let cleaned = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if cleaned.is_empty() {
        tracing::warn!("cleanup returned no text, keeping OCR output");
        original.to_string()
    } else {
        cleaned
    }
}

impl CleanupProvider for OpenAiCleanup {
    fn clean(&self, text: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt(&self.instructions(), text) },
            ],
            "temperature": TEMPERATURE,
        });
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body)
            .map_err(|e| http::classify("OpenAI", e))?;
        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| ProviderError::Transient(format!("OpenAI response: {e}")))?;
        Ok(extract_text(parsed, text))
    }
}
