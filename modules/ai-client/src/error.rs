use reqwest::StatusCode;
use thiserror::Error;

/// Substrings providers use in error bodies when throttling a caller.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "quota",
    "too many requests",
    "resource_exhausted",
];

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty response from {0}")]
    EmptyResponse(&'static str),
}

impl AiError {
    /// Classify a non-success HTTP response.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || mentions_rate_limit(&body) {
            AiError::RateLimited(body)
        } else {
            AiError::Api {
                status: status.as_u16(),
                body,
            }
        }
    }

    /// Provider throttling is backpressure, not failure. Callers wait and retry.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AiError::RateLimited(_))
    }
}

fn mentions_rate_limit(body: &str) -> bool {
    let lower = body.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AiError::Timeout(e.to_string())
        } else {
            AiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AiError {
    fn from(e: serde_json::Error) -> Self {
        AiError::Parse(e.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for AiError {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        AiError::Config(format!("invalid header value: {e}"))
    }
}
