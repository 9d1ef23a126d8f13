use axum::extract::State;
use axum::Json;
use story_llm::{
    FromProjectRequest, FromStoryRequest, FromTagsRequest, GeneratedStories, GenerationRequest,
    RefineOutput, RefineRequest, StoryGenerator,
};

use crate::error::AppError;
use crate::state::AppState;

fn generator(app: &AppState) -> StoryGenerator<'_> {
    StoryGenerator::new(app.llm.as_ref())
        .with_schema(app.config.llm.output_schema)
        .with_temperature(app.config.llm.temperature)
}

async fn run(
    app: &AppState,
    request: GenerationRequest,
    failure: &str,
) -> Result<Json<GeneratedStories>, AppError> {
    let max = app.config.generation.max_stories;
    if request.number_of_stories() > max {
        return Err(AppError::bad_request(format!(
            "numberOfStories must be at most {max}"
        )));
    }
    let out = generator(app)
        .generate(&request)
        .await
        .map_err(|e| AppError::from_llm(e, failure))?;
    tracing::info!(kind = request.kind(), generated = out.new_stories.len(), "stories generated");
    Ok(Json(out))
}

/// POST /api/generate/refine
pub async fn refine(
    State(app): State<AppState>,
    Json(body): Json<RefineRequest>,
) -> Result<Json<RefineOutput>, AppError> {
    let out = generator(&app)
        .refine(&body)
        .await
        .map_err(|e| AppError::from_llm(e, "Failed to refine user story."))?;
    Ok(Json(out))
}

/// POST /api/generate/from-story
pub async fn from_story(
    State(app): State<AppState>,
    Json(body): Json<FromStoryRequest>,
) -> Result<Json<GeneratedStories>, AppError> {
    run(&app, GenerationRequest::FromStory(body), "Failed to generate stories.").await
}

/// POST /api/generate/from-project
pub async fn from_project(
    State(app): State<AppState>,
    Json(body): Json<FromProjectRequest>,
) -> Result<Json<GeneratedStories>, AppError> {
    run(
        &app,
        GenerationRequest::FromProject(body),
        "Failed to generate stories from project.",
    )
    .await
}

/// POST /api/generate/from-tags
pub async fn from_tags(
    State(app): State<AppState>,
    Json(body): Json<FromTagsRequest>,
) -> Result<Json<GeneratedStories>, AppError> {
    run(
        &app,
        GenerationRequest::FromTags(body),
        "Failed to generate stories from tags.",
    )
    .await
}
