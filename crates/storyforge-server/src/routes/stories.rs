use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use storyforge_core::error::ForgeError;
use storyforge_core::story::{self, GeneratedStory, NewStory, UserStory};
use storyforge_core::sync::BulkReport;
use storyforge_core::types::{Direction, TagAction};
use storyforge_core::view::{self, SortKey, SortState, StoryFilter};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StoryQuery {
    /// Comma-separated; a story must carry all of them.
    pub tags: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
}

impl StoryQuery {
    fn filter(&self) -> StoryFilter {
        StoryFilter {
            tags: self.tags.as_deref().map(story::parse_tag_list).unwrap_or_default(),
            text: self.q.clone().unwrap_or_default(),
        }
    }

    fn sort_state(&self) -> Result<SortState, ForgeError> {
        let mut sort = SortState::default();
        if let Some(key) = &self.sort {
            sort.key = key.parse::<SortKey>()?;
        }
        if let Some(dir) = &self.dir {
            sort.direction = dir.parse::<Direction>()?;
        }
        Ok(sort)
    }
}

/// GET /api/users/{user}/projects/{id}/stories — filtered, sorted story view.
pub async fn list_stories(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, String)>,
    Query(query): Query<StoryQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let sort = query.sort_state()?;
    let sync = app.sync_for(&user).await?;
    let project = sync
        .project(&id)
        .ok_or_else(|| ForgeError::ProjectNotFound(id.clone()))?;
    let stories = view::apply(&project.stories, &query.filter(), sort);
    Ok(Json(serde_json::json!({
        "stories": stories,
        "allTags": view::all_tags(&project.stories),
        "sort": sort,
    })))
}

/// POST /api/users/{user}/projects/{id}/stories
pub async fn create_story(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, String)>,
    Json(body): Json<NewStory>,
) -> Result<Json<serde_json::Value>, AppError> {
    let sync = app.sync_for(&user).await?;
    sync.ensure_project(&id).await?;
    let story_id = sync.add_story(&id, &body).await?;
    Ok(Json(serde_json::json!({ "id": story_id })))
}

/// PUT /api/users/{user}/projects/{id}/stories/{story_id} — replace the
/// editable fields; `createdAt` is left alone.
pub async fn update_story(
    State(app): State<AppState>,
    Path((user, id, story_id)): Path<(String, String, String)>,
    Json(body): Json<NewStory>,
) -> Result<Json<serde_json::Value>, AppError> {
    let sync = app.sync_for(&user).await?;
    let story = UserStory {
        id: story_id.clone(),
        description: body.description,
        tags: body.tags,
        priority: body.priority,
        project_id: id.clone(),
        created_at: None,
    };
    sync.update_story(&id, &story).await?;
    Ok(Json(serde_json::json!({ "id": story_id })))
}

/// DELETE /api/users/{user}/projects/{id}/stories/{story_id}
pub async fn delete_story(
    State(app): State<AppState>,
    Path((user, id, story_id)): Path<(String, String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let sync = app.sync_for(&user).await?;
    sync.delete_story(&id, &story_id).await?;
    Ok(Json(serde_json::json!({ "deleted": story_id })))
}

#[derive(Deserialize)]
pub struct BulkAddBody {
    pub stories: Vec<GeneratedStory>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// POST /api/users/{user}/projects/{id}/stories/bulk — save generated stories.
pub async fn bulk_add(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, String)>,
    Json(body): Json<BulkAddBody>,
) -> Result<Json<BulkReport>, AppError> {
    let sync = app.sync_for(&user).await?;
    sync.ensure_project(&id).await?;
    let report = sync.add_bulk_stories(&id, &body.stories, &body.tags).await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct BulkDeleteBody {
    pub ids: Vec<String>,
}

/// POST /api/users/{user}/projects/{id}/stories/bulk-delete
pub async fn bulk_delete(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, String)>,
    Json(body): Json<BulkDeleteBody>,
) -> Result<Json<BulkReport>, AppError> {
    let sync = app.sync_for(&user).await?;
    let report = sync.bulk_delete_stories(&id, &body.ids).await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct BulkTagsBody {
    pub ids: Vec<String>,
    pub tags: Vec<String>,
    pub action: TagAction,
}

/// POST /api/users/{user}/projects/{id}/stories/bulk-tags — add or remove
/// tags on many stories.
pub async fn bulk_tags(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, String)>,
    Json(body): Json<BulkTagsBody>,
) -> Result<Json<BulkReport>, AppError> {
    let sync = app.sync_for(&user).await?;
    let report = sync
        .bulk_update_tags(&id, &body.ids, &body.tags, body.action)
        .await?;
    Ok(Json(report))
}
