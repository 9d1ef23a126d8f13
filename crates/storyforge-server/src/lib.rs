pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health))
        // Events (SSE)
        .route("/api/users/{user}/events", get(routes::events::sse_events))
        // Projects
        .route(
            "/api/users/{user}/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/api/users/{user}/projects/order",
            put(routes::projects::reorder_projects),
        )
        .route(
            "/api/users/{user}/projects/{id}",
            get(routes::projects::get_project)
                .patch(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route(
            "/api/users/{user}/projects/{id}/export",
            get(routes::export::export_csv),
        )
        // Stories
        .route(
            "/api/users/{user}/projects/{id}/stories",
            get(routes::stories::list_stories).post(routes::stories::create_story),
        )
        .route(
            "/api/users/{user}/projects/{id}/stories/bulk",
            post(routes::stories::bulk_add),
        )
        .route(
            "/api/users/{user}/projects/{id}/stories/bulk-delete",
            post(routes::stories::bulk_delete),
        )
        .route(
            "/api/users/{user}/projects/{id}/stories/bulk-tags",
            post(routes::stories::bulk_tags),
        )
        .route(
            "/api/users/{user}/projects/{id}/stories/{story_id}",
            put(routes::stories::update_story).delete(routes::stories::delete_story),
        )
        // Generation
        .route("/api/generate/refine", post(routes::generate::refine))
        .route("/api/generate/from-story", post(routes::generate::from_story))
        .route(
            "/api/generate/from-project",
            post(routes::generate::from_project),
        )
        .route("/api/generate/from-tags", post(routes::generate::from_tags))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the storyforge API server.
pub async fn serve(app_state: AppState, port: u16, open_browser: bool) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener, open_browser).await
}

/// Start the server on a pre-bound listener.
///
/// The caller can read the actual port before starting (useful when
/// `port = 0` and the OS picks a free port).
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("storyforge API listening on http://localhost:{actual_port}");

    if open_browser {
        let url = format!("http://localhost:{actual_port}/api/health");
        let _ = open::that(&url);
    }

    axum::serve(listener, app).await?;
    Ok(())
}
