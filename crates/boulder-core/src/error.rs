//! Unified error types for Boulder

use thiserror::Error;

/// Unified error type for all Boulder operations
#[derive(Error, Debug)]
pub enum BoulderError {
    // Expert call errors
    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("expert call timed out: {0}")]
    Timeout(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("expert call failed: {0}")]
    Expert(String),

    #[error("all fallbacks exhausted: {0}")]
    FallbackExhausted(String),

    // Hook errors
    #[error("call blocked by hook: {0}")]
    Blocked(String),

    #[error("hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },

    // Workflow errors
    #[error("phase error: {0}")]
    Phase(String),

    #[error("phase '{0}' timed out")]
    PhaseTimeout(String),

    // Persistence errors
    #[error("state error: {0}")]
    State(String),

    #[error("task error: {0}")]
    Task(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using BoulderError
pub type Result<T> = std::result::Result<T, BoulderError>;

/// Classified failure category for an expert call
///
/// Classification happens exactly once, at the router boundary. Typed
/// error variants drive the decision; generic `Expert(message)` errors
/// fall back to the same substring matching the original system used,
/// so collaborators that can only surface message strings behave
/// identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimit,
    Timeout,
    ServerError,
    Auth,
    BadRequest,
    Other,
}

impl FailureKind {
    /// Classify an error from the Expert Call collaborator
    pub fn classify(err: &BoulderError) -> Self {
        match err {
            BoulderError::RateLimit { .. } => Self::RateLimit,
            BoulderError::Timeout(_) => Self::Timeout,
            BoulderError::Auth(_) => Self::Auth,
            BoulderError::BadRequest(_) => Self::BadRequest,
            BoulderError::Expert(message) => Self::classify_message(message),
            _ => Self::Other,
        }
    }

    /// Compatibility classification for untyped error text
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("429") || lower.contains("rate limit") || lower.contains("overloaded") {
            Self::RateLimit
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("server error")
            || lower.contains("5xx")
            || lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
        {
            Self::ServerError
        } else if lower.contains("unauthorized")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("authentication")
            || lower.contains("invalid api key")
        {
            Self::Auth
        } else if lower.contains("400") || lower.contains("bad request") || lower.contains("malformed")
        {
            Self::BadRequest
        } else {
            Self::Other
        }
    }

    /// Whether a fallback chain should be consulted for this failure
    pub fn retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Timeout | Self::ServerError)
    }

    /// Whether this failure makes further attempts pointless
    pub fn fatal(&self) -> bool {
        matches!(self, Self::Auth | Self::BadRequest)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "rate limited"),
            Self::Timeout => write!(f, "timed out"),
            Self::ServerError => write!(f, "server error"),
            Self::Auth => write!(f, "authentication failed"),
            Self::BadRequest => write!(f, "bad request"),
            Self::Other => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_classification() {
        let err = BoulderError::RateLimit {
            message: "slow down".to_string(),
            retry_after_secs: Some(30),
        };
        assert_eq!(FailureKind::classify(&err), FailureKind::RateLimit);

        let err = BoulderError::Timeout("no response in 60s".to_string());
        assert_eq!(FailureKind::classify(&err), FailureKind::Timeout);

        let err = BoulderError::Auth("key revoked".to_string());
        assert_eq!(FailureKind::classify(&err), FailureKind::Auth);

        let err = BoulderError::BadRequest("prompt too large".to_string());
        assert_eq!(FailureKind::classify(&err), FailureKind::BadRequest);
    }

    #[test]
    fn test_message_classification_compatibility() {
        assert_eq!(
            FailureKind::classify_message("HTTP 429 Too Many Requests"),
            FailureKind::RateLimit
        );
        assert_eq!(
            FailureKind::classify_message("upstream overloaded, retry later"),
            FailureKind::RateLimit
        );
        assert_eq!(
            FailureKind::classify_message("request timed out"),
            FailureKind::Timeout
        );
        assert_eq!(
            FailureKind::classify_message("502 Bad Gateway"),
            FailureKind::ServerError
        );
        assert_eq!(
            FailureKind::classify_message("401 Unauthorized"),
            FailureKind::Auth
        );
        assert_eq!(
            FailureKind::classify_message("malformed request body"),
            FailureKind::BadRequest
        );
        assert_eq!(
            FailureKind::classify_message("connection reset by peer"),
            FailureKind::Other
        );
    }

    #[test]
    fn test_retryable_vs_fatal() {
        assert!(FailureKind::RateLimit.retryable());
        assert!(FailureKind::Timeout.retryable());
        assert!(FailureKind::ServerError.retryable());
        assert!(!FailureKind::Auth.retryable());
        assert!(!FailureKind::Other.retryable());

        assert!(FailureKind::Auth.fatal());
        assert!(FailureKind::BadRequest.fatal());
        assert!(!FailureKind::RateLimit.fatal());
        assert!(!FailureKind::Other.fatal());
    }
}
