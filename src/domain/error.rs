//! # Error Taxonomy
//!
//! Typed errors for the transport/auth layer and the response interpreter.
//! Recoverable classes (action execution, validation, parse degradation)
//! never appear here: they are folded into feedback text so the agent can
//! self-correct on the next turn.

use thiserror::Error;

/// Errors raised by the API layer (streaming and plain requests).
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response. The body is kept for diagnostics.
    #[error("request failed: {status} - {body}")]
    Status { status: u16, body: String },

    /// Connection-level failure (DNS, refused, reset, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 401 or missing/expired credentials. Never retried; the user must
    /// authenticate again.
    #[error("authentication required: {0}")]
    Auth(String),

    /// The server answered 2xx with an unusable body.
    #[error("invalid response body: {0}")]
    Body(String),
}

impl ApiError {
    /// Network failures and 5xx responses are worth retrying; everything
    /// else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::Auth(_) | ApiError::Body(_) => false,
        }
    }
}

/// Hard parse failure: the candidate was fully shaped (it carried an
/// actions collection) but does not satisfy the action schema. Malformed or
/// partial output never produces this; it degrades to a fallback talk
/// action instead.
#[derive(Debug, Error)]
#[error("agent response failed schema validation: {0}")]
pub struct SchemaError(#[from] pub serde_json::Error);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let server = ApiError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        let client = ApiError::Status {
            status: 404,
            body: "not found".into(),
        };
        let auth = ApiError::Auth("run `drover login`".into());
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!auth.is_retryable());
    }
}
