use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use storyforge_core::error::ForgeError;
use storyforge_core::export;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/users/{user}/projects/{id}/export — JIRA-import CSV attachment.
pub async fn export_csv(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let sync = app.sync_for(&user).await?;
    let project = sync
        .project(&id)
        .ok_or_else(|| ForgeError::ProjectNotFound(id.clone()))?;
    let csv = export::jira_csv(&project.stories);
    let filename = export::export_filename(&project.title);
    tracing::info!(project = %id, stories = project.stories.len(), "exported csv");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv,
    ))
}
