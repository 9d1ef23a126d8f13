use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("not initialized: run 'storyforge init'")]
    NotInitialized,

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("story not found: {0}")]
    StoryNotFound(String),

    #[error("document not found: {path}/{id}")]
    DocumentNotFound { path: String, id: String },

    #[error("invalid id '{0}': must be alphanumeric with hyphens or underscores")]
    InvalidId(String),

    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    #[error("invalid sort key: {0}")]
    InvalidSortKey(String),

    #[error("invalid tag action: {0}")]
    InvalidTagAction(String),

    #[error("invalid project order: {0}")]
    InvalidProjectOrder(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("malformed document {id}: {reason}")]
    MalformedDocument { id: String, reason: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
