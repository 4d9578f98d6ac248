//! Error types shared by the dispatch clients

use log::warn;
use reqwest::header::HeaderMap;
use std::time::Duration;
use thiserror::Error;

/// HTTP status codes treated as transient and eligible for automatic retry.
///
/// 425 (Too Early) is included deliberately: the upstream services return it
/// for replayed requests and expect clients to retry.
pub const RETRYABLE_STATUSES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

/// Errors produced by the request engine, classifier, and file resolver
///
/// This is the only type through which failure detail crosses the engine
/// boundary. Every message and body preview has already been passed through
/// [`crate::redact::redact`], so variants are safe to log or surface as-is.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection, DNS, or timeout failure after the retry budget is spent
    #[error("transport error: {0}")]
    Transport(String),

    /// The API answered with a failure status that is not (or no longer) retryable
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code of the failing response
        status: u16,
        /// Structured message extracted from the response body
        message: String,
        /// Redacted preview of the raw response body
        body: String,
    },

    /// A nominally successful response whose body could not be interpreted
    #[error("{message}")]
    Malformed {
        /// HTTP status code, when a response was received at all
        status: Option<u16>,
        /// Description plus a heuristic hint about the likely root cause
        message: String,
        /// Redacted preview of the raw response body
        body: String,
    },

    /// A file reference could not be turned into a local file
    #[error("file resolution failed: {0}")]
    File(String),

    /// Caller-supplied parameters failed validation before any network call
    #[error("validation error: {0}")]
    Validation(String),

    /// Client construction or credential material problem
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status code associated with this error, when one exists
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Malformed { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns true if the status code is in the retryable set
    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_STATUSES.contains(&status)
    }
}

/// Configuration for automatic retry behavior
///
/// Delays are deterministic: `base_delay × 2^attempt`, with the attempt index
/// starting at 0. A 429 response carrying an integer `Retry-After` header
/// overrides the computed delay with the server-directed wait, since
/// rate-limit responses carry authoritative timings that exponential backoff
/// would only guess at.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first (default: 2)
    pub max_retries: u32,

    /// Backoff unit for the exponential delay (default: 1s)
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Create a retry config with the specified max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Disable retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Exponential delay for a given retry attempt (0-indexed)
    pub(crate) fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Delay before re-attempting after a retryable status
    ///
    /// Only 429 consults `Retry-After`; a non-numeric value falls back to
    /// exponential backoff rather than failing the call.
    pub(crate) fn delay_for(&self, attempt: u32, status: u16, headers: &HeaderMap) -> Duration {
        if status == 429 {
            if let Some(value) = headers.get(reqwest::header::RETRY_AFTER) {
                if let Ok(text) = value.to_str() {
                    if let Ok(seconds) = text.trim().parse::<u64>() {
                        return Duration::from_secs(seconds);
                    }
                    warn!(
                        "Retry-After value {:?} is not an integer, using exponential backoff",
                        text
                    );
                }
            }
        }
        self.backoff_delay(attempt)
    }
}
