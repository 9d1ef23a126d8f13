use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use story_llm::LlmError;
use storyforge_core::error::ForgeError;

// ---------------------------------------------------------------------------
// Internal sentinels
// ---------------------------------------------------------------------------

/// A failed call to the text-generation backend, already reduced to a
/// user-facing message.
#[derive(Debug)]
struct UpstreamError(String);

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UpstreamError {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(ForgeError::Validation(msg.into()).into())
    }

    /// Convert a generation failure. Request errors keep their message and
    /// map to 400; backend errors are logged and replaced by `user_message`.
    pub fn from_llm(err: LlmError, user_message: &str) -> Self {
        if err.is_invalid_request() {
            return Self(err.into());
        }
        tracing::error!(error = %err, "{user_message}");
        Self(UpstreamError(user_message.to_string()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(u) = self.0.downcast_ref::<UpstreamError>() {
            let body = serde_json::json!({ "error": u.0.clone() });
            return (StatusCode::BAD_GATEWAY, axum::Json(body)).into_response();
        }

        let status = if let Some(e) = self.0.downcast_ref::<ForgeError>() {
            match e {
                ForgeError::NotInitialized => StatusCode::BAD_REQUEST,
                ForgeError::ProjectNotFound(_)
                | ForgeError::StoryNotFound(_)
                | ForgeError::DocumentNotFound { .. } => StatusCode::NOT_FOUND,
                ForgeError::InvalidId(_)
                | ForgeError::InvalidPriority(_)
                | ForgeError::InvalidSortKey(_)
                | ForgeError::InvalidTagAction(_)
                | ForgeError::InvalidProjectOrder(_)
                | ForgeError::Validation(_) => StatusCode::BAD_REQUEST,
                ForgeError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                ForgeError::MalformedDocument { .. }
                | ForgeError::Io(_)
                | ForgeError::Yaml(_)
                | ForgeError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else if let Some(e) = self.0.downcast_ref::<LlmError>() {
            if e.is_invalid_request() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::BAD_GATEWAY
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
