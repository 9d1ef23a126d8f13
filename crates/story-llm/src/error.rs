use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Request rejected before any backend call.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("API key not found in environment variable {0}")]
    MissingApiKey(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to parse model output: {0}")]
    Parse(String),

    #[error("model output did not match schema: {}", .0.join("; "))]
    SchemaMismatch(Vec<String>),
}

impl LlmError {
    /// True for errors the caller caused, as opposed to backend failures.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, LlmError::InvalidRequest(_))
    }
}
