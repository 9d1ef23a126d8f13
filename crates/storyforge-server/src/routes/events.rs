use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt as _;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/users/{user}/events — SSE stream. `projects` carries the full
/// merged list on every change (the first event is the current list);
/// `notice` carries failed-mutation notifications.
pub async fn sse_events(
    State(app): State<AppState>,
    Path(user): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let sync = app.sync_for(&user).await?;

    let projects = WatchStream::new(sync.list_projects()).filter_map(|projects| {
        Event::default()
            .event("projects")
            .json_data(&projects)
            .ok()
            .map(Ok::<Event, Infallible>)
    });
    let notices = BroadcastStream::new(sync.notices()).filter_map(|msg| {
        msg.ok().and_then(|notice| {
            Event::default()
                .event("notice")
                .json_data(&notice)
                .ok()
                .map(Ok::<Event, Infallible>)
        })
    });

    let stream = stream::select(projects, notices);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
