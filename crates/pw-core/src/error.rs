use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation failed on {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("planning failed: {0}")]
    Planning(String),

    #[error("refining failed: {0}")]
    Refining(String),

    #[error("scheduling failed: {0}")]
    Scheduling(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn planning(message: impl Into<String>) -> Self {
        Self::Planning(message.into())
    }

    pub fn refining(message: impl Into<String>) -> Self {
        Self::Refining(message.into())
    }

    pub fn scheduling(message: impl Into<String>) -> Self {
        Self::Scheduling(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Whether a backend call that produced this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::RateLimit(_) | Error::Timeout(_) | Error::Serialization(_)
        )
    }

    /// Stage label used in CLI failure messages (`planning`, `refining`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::Planning(_) => "planning",
            Error::Refining(_) => "refining",
            Error::Scheduling(_) => "scheduling",
            Error::Persistence(_) => "persistence",
            Error::Api { .. } => "api",
            Error::Auth(_) => "auth",
            Error::RateLimit(_) => "rate-limit",
            Error::InvalidRequest(_) => "invalid-request",
            Error::Network(_) => "network",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Timeout(_) => "timeout",
            Error::Cancelled => "cancelled",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::api(429, "slow down");
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("slow down"));

        let err = Error::validation("subtask.title", "must not be empty");
        assert!(err.to_string().contains("subtask.title"));
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::network("connection reset").is_retryable());
        assert!(Error::rate_limit("too many requests").is_retryable());
        assert!(Error::timeout("no response after 30s").is_retryable());
        assert!(Error::serialization("bad payload").is_retryable());
        assert!(!Error::auth("invalid key").is_retryable());
        assert!(!Error::planning("retries exhausted").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(Error::planning("x").kind(), "planning");
        assert_eq!(Error::scheduling("x").kind(), "scheduling");
        assert_eq!(Error::Cancelled.kind(), "cancelled");
    }
}
