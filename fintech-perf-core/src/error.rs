use crate::journey::ExpectedStatus;
use thiserror::Error;

/// Errors which abort a run before any load is generated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported perf.profile: {0}. Supported: smoke|baseline|stress")]
    UnsupportedProfile(String),

    #[error("Malformed override `{0}`, expected key=value")]
    MalformedOverride(String),
}

/// Reasons a single journey step fails. A step failure ends the iteration it
/// belongs to and nothing else.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepError {
    #[error("Expected status {expected}, got {actual}")]
    UnexpectedStatus {
        expected: ExpectedStatus,
        actual: u16,
    },

    #[error("Response is missing `{0}`")]
    MissingField(String),

    #[error("`{path}` was `{actual}`, expected `{expected}`")]
    UnexpectedValue {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Response body is not valid JSON: {0}")]
    InvalidBody(String),

    #[error("Template references unbound variable `{0}`")]
    UnboundVariable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),
}
