//! Exponential backoff with jitter around external-service calls.

use std::time::Duration;

use rand::Rng as _;

use inkwell_core::config::RetrySettings;

use crate::error::ProviderError;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_retries: s.max_retries,
            base_delay_ms: s.base_delay_ms,
            max_delay_ms: s.max_delay_ms,
        }
    }
}

impl RetryConfig {
    /// No retries and no sleeping.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    ///
    /// Formula: `min(base_delay * 2^retry, max_delay) + random_jitter(0..base_delay)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exp_delay = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped = exp_delay.min(self.max_delay_ms);
        let jitter = if self.base_delay_ms > 0 {
            rand::thread_rng().gen_range(0..self.base_delay_ms)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

/// Classifier for [`ProviderError`]: only transient failures are retried.
pub fn classify_provider_error(e: &ProviderError) -> RetryAction {
    if e.is_transient() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

/// Run `operation` until it succeeds, the classifier aborts, or
/// `max_retries` retries have been spent. Blocks the calling thread between
/// attempts. Returns the last error on exhaustion.
pub fn retry_with_backoff<F, T, E, C>(
    config: &RetryConfig,
    what: &str,
    classifier: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_retries + 1;
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(val) => return Ok(val),
            Err(e) => {
                attempt += 1;
                if classifier(&e) == RetryAction::Abort || attempt >= total_attempts {
                    return Err(e);
                }
                let delay = config.delay_for_retry(attempt - 1);
                tracing::warn!(
                    "{what} failed (attempt {attempt}/{total_attempts}), retrying in {}ms: {e}",
                    delay.as_millis()
                );
                std::thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn default_matches_config_defaults() {
        let from_settings = RetryConfig::from(&RetrySettings::default());
        assert_eq!(from_settings, RetryConfig::default());
    }

    #[test]
    fn delay_grows_exponentially() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 2,
            max_delay_ms: 60,
        };
        let d = config.delay_for_retry(0).as_millis();
        assert!((2..4).contains(&d));
        let d = config.delay_for_retry(2).as_millis();
        assert!((8..10).contains(&d));
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay_ms: 5,
            max_delay_ms: 30,
        };
        let d = config.delay_for_retry(10).as_millis();
        assert!((30..35).contains(&d));
    }

    #[test]
    fn zero_base_has_no_delay() {
        assert_eq!(RetryConfig::none().delay_for_retry(3), Duration::ZERO);
    }

    #[test]
    fn transient_errors_are_retried_until_success() {
        let calls = Cell::new(0);
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        };
        let result: Result<u32, ProviderError> =
            retry_with_backoff(&config, "ocr", classify_provider_error, || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(ProviderError::Transient("429".into()))
                } else {
                    Ok(7)
                }
            });
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhaustion_returns_last_error() {
        let calls = Cell::new(0);
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 0,
            max_delay_ms: 0,
        };
        let result: Result<(), ProviderError> =
            retry_with_backoff(&config, "ocr", classify_provider_error, || {
                calls.set(calls.get() + 1);
                Err(ProviderError::Transient(format!("try {}", calls.get())))
            });
        assert_eq!(result, Err(ProviderError::Transient("try 3".into())));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn terminal_errors_abort_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), ProviderError> =
            retry_with_backoff(&RetryConfig::default(), "cleanup", classify_provider_error, || {
                calls.set(calls.get() + 1);
                Err(ProviderError::Terminal("401".into()))
            });
        assert!(matches!(result, Err(ProviderError::Terminal(_))));
        assert_eq!(calls.get(), 1);
    }
}
