//! Shared HTTP plumbing for the OCR and cleanup services.

use std::time::Duration;

use inkwell_sync::ProviderError;

pub fn agent(timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// Map a failed request onto the engine's failure classes.
///
/// Rate limits, quota, server errors and network trouble are transient;
/// rejected credentials are terminal; any other client error means this
/// input cannot be handled.
pub fn classify(service: &str, err: ureq::Error) -> ProviderError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            let detail = format!("{service} returned HTTP {code}: {}", truncate(&body, 300));
            match code {
                401 | 403 => ProviderError::Terminal(detail),
                408 | 429 | 500..=599 => ProviderError::Transient(detail),
                _ => ProviderError::Unavailable(detail),
            }
        }
        ureq::Error::Transport(t) => ProviderError::Transient(format!("{service}: {t}")),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
