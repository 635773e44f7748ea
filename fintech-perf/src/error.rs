use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("Unable to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
