//! The four story flows: refine one story, and generate N stories from a
//! story, from a project description, or from a description plus tags.
//!
//! Each flow is one prompt, one backend call, and a schema-checked decode of
//! the reply. Requests are validated before anything is sent.

use crate::backend::{CompletionRequest, LlmBackend};
use crate::error::LlmError;
use crate::{structured, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use storyforge_core::config::OutputSchemaVersion;
use storyforge_core::story::GeneratedStory;
use storyforge_core::types::Priority;

const SYSTEM_PROMPT: &str = "You are a product owner who is an expert at writing user stories. \
Always answer with a single JSON object and nothing else.";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineRequest {
    pub user_story: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FromStoryRequest {
    pub existing_story: String,
    pub number_of_stories: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FromProjectRequest {
    pub project_description: String,
    pub number_of_stories: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FromTagsRequest {
    pub project_description: String,
    pub tags: Vec<String>,
    pub number_of_stories: u32,
}

/// A request for N new stories.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    FromStory(FromStoryRequest),
    FromProject(FromProjectRequest),
    FromTags(FromTagsRequest),
}

impl GenerationRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationRequest::FromStory(_) => "from_story",
            GenerationRequest::FromProject(_) => "from_project",
            GenerationRequest::FromTags(_) => "from_tags",
        }
    }

    pub fn number_of_stories(&self) -> u32 {
        match self {
            GenerationRequest::FromStory(r) => r.number_of_stories,
            GenerationRequest::FromProject(r) => r.number_of_stories,
            GenerationRequest::FromTags(r) => r.number_of_stories,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.number_of_stories() < 1 {
            return Err(LlmError::InvalidRequest(
                "numberOfStories must be at least 1".to_string(),
            ));
        }
        match self {
            GenerationRequest::FromStory(r) => require_text("existingStory", &r.existing_story),
            GenerationRequest::FromProject(r) => {
                require_text("projectDescription", &r.project_description)
            }
            GenerationRequest::FromTags(r) => {
                require_text("projectDescription", &r.project_description)?;
                if r.tags.iter().all(|t| t.trim().is_empty()) {
                    return Err(LlmError::InvalidRequest(
                        "at least one tag is required".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    fn prompt(&self, schema: OutputSchemaVersion) -> String {
        let n = self.number_of_stories();
        let body = match self {
            GenerationRequest::FromStory(r) => format!(
                "Based on the following existing user story, generate {n} new user stories.\n\n\
                 Existing User Story: {}",
                r.existing_story
            ),
            GenerationRequest::FromProject(r) => format!(
                "Based on the following project description, generate {n} new user stories.\n\n\
                 Project Description: {}",
                r.project_description
            ),
            GenerationRequest::FromTags(r) => format!(
                "Based on the following project description and tags, generate {n} new user stories.\n\n\
                 Project Description: {}\n\nTags: {}",
                r.project_description,
                r.tags.join(", ")
            ),
        };
        format!("{body}\n\n{}", output_instructions(schema))
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LlmError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output schemas
// ---------------------------------------------------------------------------

fn output_instructions(schema: OutputSchemaVersion) -> &'static str {
    match schema {
        OutputSchemaVersion::V1 => {
            r#"Respond with JSON of the form {"newStories": ["<user story>", ...]}."#
        }
        OutputSchemaVersion::V2 => {
            r#"Respond with JSON of the form {"newStories": [{"description": "<user story>", "priority": "<Highest|High|Medium|Low|Lowest>"}, ...]}."#
        }
    }
}

/// JSON Schema the model reply must satisfy.
pub fn stories_schema(version: OutputSchemaVersion) -> Value {
    let item = match version {
        OutputSchemaVersion::V1 => json!({ "type": "string" }),
        OutputSchemaVersion::V2 => {
            let priorities: Vec<&str> = Priority::all().iter().map(|p| p.as_str()).collect();
            json!({
                "type": "object",
                "properties": {
                    "description": { "type": "string", "minLength": 1 },
                    "priority": { "type": "string", "enum": priorities }
                },
                "required": ["description", "priority"]
            })
        }
    };
    json!({
        "type": "object",
        "properties": {
            "newStories": { "type": "array", "items": item }
        },
        "required": ["newStories"]
    })
}

pub fn refine_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "refinedUserStory": { "type": "string", "minLength": 1 }
        },
        "required": ["refinedUserStory"]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyOutput {
    new_stories: Vec<String>,
}

/// Generated stories, always carrying a priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedStories {
    pub new_stories: Vec<GeneratedStory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineOutput {
    pub refined_user_story: String,
}

/// Decode a reply in `version`'s shape. Legacy string items get `Medium`.
pub fn decode_stories(raw: &str, version: OutputSchemaVersion) -> Result<GeneratedStories> {
    let schema = stories_schema(version);
    match version {
        OutputSchemaVersion::V2 => structured::decode(raw, &schema),
        OutputSchemaVersion::V1 => {
            let legacy: LegacyOutput = structured::decode(raw, &schema)?;
            Ok(GeneratedStories {
                new_stories: legacy
                    .new_stories
                    .into_iter()
                    .map(|d| GeneratedStory::new(d, Priority::Medium))
                    .collect(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// StoryGenerator
// ---------------------------------------------------------------------------

/// Runs the flows against one backend.
pub struct StoryGenerator<'a> {
    backend: &'a dyn LlmBackend,
    schema: OutputSchemaVersion,
    temperature: Option<f32>,
}

impl<'a> StoryGenerator<'a> {
    pub fn new(backend: &'a dyn LlmBackend) -> Self {
        Self {
            backend,
            schema: OutputSchemaVersion::default(),
            temperature: None,
        }
    }

    pub fn with_schema(mut self, schema: OutputSchemaVersion) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedStories> {
        request.validate()?;
        tracing::debug!(
            kind = request.kind(),
            n = request.number_of_stories(),
            model = self.backend.id(),
            "generating stories"
        );
        let raw = self
            .backend
            .complete(self.completion(request.prompt(self.schema)))
            .await?;
        let out = decode_stories(&raw, self.schema)?;
        if out.new_stories.len() != request.number_of_stories() as usize {
            tracing::debug!(
                requested = request.number_of_stories(),
                returned = out.new_stories.len(),
                "model returned a different story count"
            );
        }
        Ok(out)
    }

    pub async fn refine(&self, request: &RefineRequest) -> Result<RefineOutput> {
        require_text("userStory", &request.user_story)?;
        let prompt = format!(
            "Refine the following user story to improve its clarity and completeness.\n\n\
             User Story: {}\n\n\
             Respond with JSON of the form {{\"refinedUserStory\": \"<refined story>\"}}.",
            request.user_story
        );
        let raw = self.backend.complete(self.completion(prompt)).await?;
        structured::decode(&raw, &refine_schema())
    }

    fn completion(&self, prompt: String) -> CompletionRequest {
        CompletionRequest::user(prompt)
            .with_system(SYSTEM_PROMPT)
            .with_temperature(self.temperature)
            .json()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
