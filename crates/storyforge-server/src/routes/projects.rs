use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use storyforge_core::error::ForgeError;
use storyforge_core::project::{Project, ProjectUpdate};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/users/{user}/projects — merged project list with stories.
pub async fn list_projects(
    State(app): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<Project>>, AppError> {
    let sync = app.sync_for(&user).await?;
    Ok(Json(sync.projects()))
}

#[derive(Deserialize)]
pub struct CreateProjectBody {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// POST /api/users/{user}/projects — create a project at the end of the list.
pub async fn create_project(
    State(app): State<AppState>,
    Path(user): Path<String>,
    Json(body): Json<CreateProjectBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let sync = app.sync_for(&user).await?;
    let id = sync.add_project(&body.title, &body.description).await?;
    Ok(Json(serde_json::json!({ "id": id })))
}

/// GET /api/users/{user}/projects/{id}
pub async fn get_project(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<Json<Project>, AppError> {
    let sync = app.sync_for(&user).await?;
    let project = sync
        .project(&id)
        .ok_or_else(|| ForgeError::ProjectNotFound(id.clone()))?;
    Ok(Json(project))
}

/// PATCH /api/users/{user}/projects/{id} — edit title and/or description.
pub async fn update_project(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, String)>,
    Json(update): Json<ProjectUpdate>,
) -> Result<Json<serde_json::Value>, AppError> {
    let sync = app.sync_for(&user).await?;
    sync.update_project(&id, &update).await?;
    Ok(Json(serde_json::json!({ "id": id })))
}

/// DELETE /api/users/{user}/projects/{id} — delete the project and its stories.
pub async fn delete_project(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let sync = app.sync_for(&user).await?;
    sync.ensure_project(&id).await?;
    sync.delete_project(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

#[derive(Deserialize)]
pub struct ReorderBody {
    pub ids: Vec<String>,
}

/// PUT /api/users/{user}/projects/order — `order = index` for each listed id.
/// Responds with the list as it stands after the optimistic update.
pub async fn reorder_projects(
    State(app): State<AppState>,
    Path(user): Path<String>,
    Json(body): Json<ReorderBody>,
) -> Result<Json<Vec<Project>>, AppError> {
    let sync = app.sync_for(&user).await?;
    sync.set_projects_order(&body.ids).await?;
    Ok(Json(sync.projects()))
}
