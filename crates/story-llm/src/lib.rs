//! `story-llm` — schema-validated user-story generation.
//!
//! ```text
//! GenerationRequest / RefineRequest
//!     │  validate (no I/O on failure)
//!     ▼
//! StoryGenerator  ← prompt template + output instructions
//!     │
//!     ▼
//! dyn LlmBackend  ← OpenAiBackend (chat/completions) | MockBackend
//!     │
//!     ▼
//! structured::decode ← JSON parse, JSON Schema check, serde
//! ```

pub mod backend;
pub mod error;
pub mod flows;
pub mod mock;
pub mod openai;
pub mod structured;

pub use backend::{CompletionRequest, LlmBackend};
pub use error::LlmError;
pub use flows::{
    FromProjectRequest, FromStoryRequest, FromTagsRequest, GeneratedStories, GenerationRequest,
    RefineOutput, RefineRequest, StoryGenerator,
};
pub use mock::MockBackend;
pub use openai::OpenAiBackend;

use std::sync::Arc;
use storyforge_core::config::{LlmConfig, LlmProvider};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Build the backend named by `config.provider`.
pub fn backend_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmBackend>> {
    match config.provider {
        LlmProvider::OpenAi => Ok(Arc::new(OpenAiBackend::from_config(config)?)),
        LlmProvider::Mock => Ok(Arc::new(MockBackend::offline())),
    }
}
