use axum::http::StatusCode;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use story_llm::{LlmError, MockBackend};
use storyforge_core::config::Config;
use storyforge_core::store::MemoryStore;
use storyforge_server::{build_router, AppState};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn app_with(llm: Arc<MockBackend>) -> (axum::Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), llm, Config::default());
    (build_router(state), store)
}

fn app() -> (axum::Router, Arc<MemoryStore>) {
    app_with(Arc::new(MockBackend::default()))
}

/// Send a request via `oneshot` and return (status, parsed JSON body).
async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            axum::body::Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => axum::body::Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None).await
}

async fn post_json(
    app: &axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(body)).await
}

/// Poll `uri` until `pred` holds on the JSON body. Listener-driven views
/// trail the write that changed them.
async fn eventually<F>(app: &axum::Router, uri: &str, pred: F) -> serde_json::Value
where
    F: Fn(&serde_json::Value) -> bool,
{
    for _ in 0..100 {
        let (status, json) = get(app, uri).await;
        if status == StatusCode::OK && pred(&json) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held for {uri}");
}

async fn create_project(app: &axum::Router, title: &str) -> String {
    let (status, json) = post_json(
        app,
        "/api/users/alice/projects",
        serde_json::json!({ "title": title, "description": "desc" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    json["id"].as_str().unwrap().to_string()
}

async fn create_story(app: &axum::Router, project: &str, body: serde_json::Value) -> String {
    let (status, json) = post_json(
        app,
        &format!("/api/users/alice/projects/{project}/stories"),
        body,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    json["id"].as_str().unwrap().to_string()
}

fn project_ids(json: &serde_json::Value) -> Vec<String> {
    json.as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect()
}

fn stories_len(json: &serde_json::Value) -> usize {
    json["stories"].as_array().map(|a| a.len()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = app();
    let (status, json) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["model"], "mock-model");
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_and_list_projects() {
    let (app, _) = app();
    let first = create_project(&app, "Alpha").await;
    let second = create_project(&app, "Beta").await;

    let json = eventually(&app, "/api/users/alice/projects", |j| {
        j.as_array().map(|a| a.len() == 2).unwrap_or(false)
    })
    .await;
    assert_eq!(project_ids(&json), vec![first, second]);
    assert_eq!(json[0]["order"], 1);
    assert_eq!(json[1]["order"], 2);
    assert_eq!(json[0]["userId"], "alice");
}

#[tokio::test]
async fn blank_title_is_400() {
    let (app, _) = app();
    let (status, json) = post_json(
        &app,
        "/api/users/alice/projects",
        serde_json::json!({ "title": "  " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("title"));
}

#[tokio::test]
async fn invalid_user_is_400() {
    let (app, _) = app();
    let (status, _) = get(&app, "/api/users/bad%20user/projects").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_project_is_404() {
    let (app, _) = app();
    let (status, _) = get(&app, "/api/users/alice/projects/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = post_json(
        &app,
        "/api/users/alice/projects/nope/stories",
        serde_json::json!({ "description": "x" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patch_updates_title() {
    let (app, _) = app();
    let id = create_project(&app, "Alpha").await;
    let uri = format!("/api/users/alice/projects/{id}");
    let (status, _) = send(
        &app,
        "PATCH",
        &uri,
        Some(serde_json::json!({ "title": "Renamed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = eventually(&app, &uri, |j| j["title"] == "Renamed").await;
    assert_eq!(json["description"], "desc");
}

#[tokio::test]
async fn reorder_is_reflected_immediately() {
    let (app, _) = app();
    let p1 = create_project(&app, "P1").await;
    let p2 = create_project(&app, "P2").await;
    let p3 = create_project(&app, "P3").await;
    eventually(&app, "/api/users/alice/projects", |j| {
        j.as_array().map(|a| a.len() == 3).unwrap_or(false)
    })
    .await;

    let (status, json) = send(
        &app,
        "PUT",
        "/api/users/alice/projects/order",
        Some(serde_json::json!({ "ids": [p2, p1, p3] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(project_ids(&json), vec![p2.clone(), p1.clone(), p3.clone()]);
    let orders: Vec<i64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["order"].as_i64().unwrap())
        .collect();
    assert_eq!(orders, vec![0, 1, 2]);
}

#[tokio::test]
async fn partial_reorder_is_400_and_orders_stay_distinct() {
    let (app, _) = app();
    let p1 = create_project(&app, "P1").await;
    let p2 = create_project(&app, "P2").await;
    let p3 = create_project(&app, "P3").await;
    eventually(&app, "/api/users/alice/projects", |j| {
        j.as_array().map(|a| a.len() == 3).unwrap_or(false)
    })
    .await;

    let (status, _) = send(
        &app,
        "PUT",
        "/api/users/alice/projects/order",
        Some(serde_json::json!({ "ids": [p3, p2] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = get(&app, "/api/users/alice/projects").await;
    assert_eq!(project_ids(&json), vec![p1, p2, p3]);
}

#[tokio::test]
async fn failed_reorder_is_503_and_list_reverts() {
    let (app, store) = app();
    let p1 = create_project(&app, "P1").await;
    let p2 = create_project(&app, "P2").await;
    eventually(&app, "/api/users/alice/projects", |j| {
        j.as_array().map(|a| a.len() == 2).unwrap_or(false)
    })
    .await;

    store.set_fail_writes(true);
    let (status, _) = send(
        &app,
        "PUT",
        "/api/users/alice/projects/order",
        Some(serde_json::json!({ "ids": [p2, p1] })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, json) = get(&app, "/api/users/alice/projects").await;
    assert_eq!(project_ids(&json), vec![p1, p2]);
}

#[tokio::test]
async fn delete_project_removes_stories() {
    let (app, _) = app();
    let keep = create_project(&app, "Keep").await;
    let gone = create_project(&app, "Gone").await;
    create_story(&app, &gone, serde_json::json!({ "description": "a" })).await;
    create_story(&app, &keep, serde_json::json!({ "description": "b" })).await;
    eventually(&app, &format!("/api/users/alice/projects/{gone}/stories"), |j| {
        stories_len(j) == 1
    })
    .await;

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/users/alice/projects/{gone}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let json = eventually(&app, "/api/users/alice/projects", |j| {
        j.as_array().map(|a| a.len() == 1).unwrap_or(false)
    })
    .await;
    assert_eq!(project_ids(&json), vec![keep.clone()]);
    let (status, _) = get(&app, &format!("/api/users/alice/projects/{gone}/stories")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Stories
// ---------------------------------------------------------------------------

#[tokio::test]
async fn story_list_filters_and_sorts() {
    let (app, _) = app();
    let pid = create_project(&app, "Alpha").await;
    for (d, tags, p) in [
        ("Login page", vec!["ui", "auth"], "Low"),
        ("Signup flow", vec!["ui"], "Highest"),
        ("Token refresh", vec!["auth", "ui"], "High"),
    ] {
        create_story(
            &app,
            &pid,
            serde_json::json!({ "description": d, "tags": tags, "priority": p }),
        )
        .await;
    }
    let base = format!("/api/users/alice/projects/{pid}/stories");
    eventually(&app, &base, |j| stories_len(j) == 3).await;

    let (_, json) = get(&app, &format!("{base}?tags=auth,ui&sort=priority&dir=asc")).await;
    let descs: Vec<&str> = json["stories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["description"].as_str().unwrap())
        .collect();
    assert_eq!(descs, vec!["Token refresh", "Login page"]);

    let (_, json) = get(&app, &format!("{base}?q=SIGNUP")).await;
    assert_eq!(stories_len(&json), 1);

    let (status, _) = get(&app, &format!("{base}?sort=colour")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_story_keeps_created_at() {
    let (app, _) = app();
    let pid = create_project(&app, "Alpha").await;
    let sid = create_story(&app, &pid, serde_json::json!({ "description": "old" })).await;
    let base = format!("/api/users/alice/projects/{pid}/stories");
    let before = eventually(&app, &base, |j| stories_len(j) == 1).await;
    let created = before["stories"][0]["createdAt"].clone();
    assert!(created.is_string());

    let (status, _) = send(
        &app,
        "PUT",
        &format!("{base}/{sid}"),
        Some(serde_json::json!({ "description": "new", "priority": "Lowest", "tags": ["x"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let after = eventually(&app, &base, |j| j["stories"][0]["description"] == "new").await;
    assert_eq!(after["stories"][0]["createdAt"], created);
    assert_eq!(after["stories"][0]["priority"], "Lowest");
}

#[tokio::test]
async fn update_missing_story_is_404() {
    let (app, _) = app();
    let pid = create_project(&app, "Alpha").await;
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/users/alice/projects/{pid}/stories/ghost"),
        Some(serde_json::json!({ "description": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_add_tags_generated_stories() {
    let (app, _) = app();
    let pid = create_project(&app, "Alpha").await;
    let (status, report) = post_json(
        &app,
        &format!("/api/users/alice/projects/{pid}/stories/bulk"),
        serde_json::json!({
            "stories": [{ "description": "A", "priority": "High" }],
            "tags": ["x"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["succeeded"].as_array().unwrap().len(), 1);

    let json = eventually(
        &app,
        &format!("/api/users/alice/projects/{pid}/stories"),
        |j| stories_len(j) == 1,
    )
    .await;
    assert_eq!(json["stories"][0]["tags"], serde_json::json!(["generated", "x"]));
    assert_eq!(json["stories"][0]["priority"], "High");
}

#[tokio::test]
async fn bulk_tags_then_bulk_delete() {
    let (app, _) = app();
    let pid = create_project(&app, "Alpha").await;
    let s1 = create_story(&app, &pid, serde_json::json!({ "description": "1", "tags": ["bug"] })).await;
    let s2 = create_story(&app, &pid, serde_json::json!({ "description": "2", "tags": ["bug"] })).await;
    let base = format!("/api/users/alice/projects/{pid}/stories");

    let (status, report) = post_json(
        &app,
        &format!("{base}/bulk-tags"),
        serde_json::json!({ "ids": [s1, s2], "tags": ["bug"], "action": "remove" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["failed"].as_array().unwrap().len(), 0);
    eventually(&app, &format!("{base}?tags=bug"), |j| {
        j["stories"].as_array().map(|a| a.is_empty()).unwrap_or(false)
            && j["allTags"].as_array().map(|a| a.is_empty()).unwrap_or(false)
    })
    .await;

    let (status, _) = post_json(
        &app,
        &format!("{base}/bulk-tags"),
        serde_json::json!({ "ids": [s1], "tags": [], "action": "add" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, report) = post_json(
        &app,
        &format!("{base}/bulk-delete"),
        serde_json::json!({ "ids": [s1, s2] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["succeeded"].as_array().unwrap().len(), 2);
    eventually(&app, &base, |j| stories_len(j) == 0).await;
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[tokio::test]
async fn export_returns_csv_attachment() {
    let (app, _) = app();
    let pid = create_project(&app, "My Project").await;
    create_story(
        &app,
        &pid,
        serde_json::json!({ "description": "He said \"hi\". Then left.", "tags": ["a", "b"] }),
    )
    .await;
    eventually(
        &app,
        &format!("/api/users/alice/projects/{pid}/stories"),
        |j| stories_len(j) == 1,
    )
    .await;

    let req = axum::http::Request::builder()
        .uri(format!("/api/users/alice/projects/{pid}/export"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(axum::http::header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("My_Project_stories.csv"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let csv = String::from_utf8(body.to_vec()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("Summary,Description,Labels,Issue Type,Created Date")
    );
    let row = lines.next().unwrap();
    assert!(row.starts_with(r#""He said ""hi""."","He said ""hi"". Then left.","a b",Story,""#));
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_from_tags_returns_prioritized_stories() {
    let llm = Arc::new(MockBackend::default());
    llm.push_response(r#"{"newStories":[{"description":"A","priority":"High"}]}"#);
    let (app, _) = app_with(llm.clone());

    let (status, json) = post_json(
        &app,
        "/api/generate/from-tags",
        serde_json::json!({ "projectDescription": "shop", "tags": ["ui"], "numberOfStories": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["newStories"][0]["priority"], "High");
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn generate_validation_errors_are_400() {
    let llm = Arc::new(MockBackend::default());
    let (app, _) = app_with(llm.clone());

    let (status, _) = post_json(
        &app,
        "/api/generate/from-project",
        serde_json::json!({ "projectDescription": "shop", "numberOfStories": 0 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = post_json(
        &app,
        "/api/generate/from-story",
        serde_json::json!({ "existingStory": "x", "numberOfStories": 11 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("at most 10"));

    let (status, _) = post_json(
        &app,
        "/api/generate/from-tags",
        serde_json::json!({ "projectDescription": "shop", "tags": [], "numberOfStories": 2 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn backend_failure_is_opaque_502() {
    let llm = Arc::new(MockBackend::default());
    llm.push_error(LlmError::Network("connection refused".into()));
    let (app, _) = app_with(llm);

    let (status, json) = post_json(
        &app,
        "/api/generate/from-project",
        serde_json::json!({ "projectDescription": "shop", "numberOfStories": 3 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "Failed to generate stories from project.");
}

#[tokio::test]
async fn refine_returns_refined_text() {
    let llm = Arc::new(MockBackend::default());
    llm.push_response(r#"{"refinedUserStory":"As a shopper, I can pay."}"#);
    let (app, _) = app_with(llm);

    let (status, json) = post_json(
        &app,
        "/api/generate/refine",
        serde_json::json!({ "userStory": "pay" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["refinedUserStory"], "As a shopper, I can pay.");
}
