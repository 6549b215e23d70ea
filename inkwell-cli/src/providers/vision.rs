//! Google Cloud Vision `DOCUMENT_TEXT_DETECTION`, authenticated by API key.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;

use inkwell_core::config::VisionSettings;
use inkwell_sync::providers::OcrProvider;
use inkwell_sync::ProviderError;

use super::http;

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

pub struct GoogleVisionOcr {
    agent: ureq::Agent,
    endpoint: String,
    api_key: Option<String>,
}

impl GoogleVisionOcr {
    pub fn new(settings: &VisionSettings, api_key: Option<String>) -> Self {
        GoogleVisionOcr {
            agent: http::agent(settings.timeout_secs),
            endpoint: settings.endpoint.clone(),
            api_key,
        }
    }
}

/// Map an in-band `google.rpc.Status` code to a provider error.
///
/// `DEADLINE_EXCEEDED` (4), `RESOURCE_EXHAUSTED` (8) and `UNAVAILABLE` (14)
/// are retried; `PERMISSION_DENIED` (7) and `UNAUTHENTICATED` (16) stop the run.
fn status_error(status: ApiStatus) -> ProviderError {
    let message = format!("vision error {}: {}", status.code, status.message);
    match status.code {
        4 | 8 | 14 => ProviderError::Transient(message),
        7 | 16 => ProviderError::Terminal(message),
        _ => ProviderError::Unavailable(message),
    }
}

/// Text of the first image response; a page without text yields "".
fn extract_text(response: AnnotateResponse) -> Result<String, ProviderError> {
    let first = response.responses.into_iter().next().unwrap_or_default();
    if let Some(err) = first.error {
        return Err(status_error(err));
    }
    Ok(first
        .full_text_annotation
        .map(|a| a.text.trim().to_string())
        .unwrap_or_default())
}

impl OcrProvider for GoogleVisionOcr {
    fn recognize(&self, image: &Path) -> Result<String, ProviderError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(ProviderError::Terminal(
                "Google Vision API key is not configured".to_string(),
            ));
        };
        let bytes = fs::read(image)
            .map_err(|e| ProviderError::Unavailable(format!("{}: {e}", image.display())))?;
        let body = json!({
            "requests": [{
                "image": { "content": STANDARD.encode(bytes) },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
            }]
        });

        let response = self
            .agent
            .post(&self.endpoint)
            .query("key", key)
            .send_json(body)
            .map_err(|e| http::classify("Google Vision", e))?;
        let parsed: AnnotateResponse = response
            .into_json()
            .map_err(|e| ProviderError::Transient(format!("Google Vision response: {e}")))?;
        extract_text(parsed)
    }
}
