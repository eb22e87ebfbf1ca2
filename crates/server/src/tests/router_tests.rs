use super::*;
use axum::{body, body::Body, http::Request};
use shared::domain::TodoStatus;
use tower::ServiceExt;

use crate::api::ApiContext;

fn test_app(auth_token: Option<&str>) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        ApiContext::new(32),
        auth_token.map(str::to_string),
    ));
    (build_router(Arc::clone(&state)), state)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (app, _state) = test_app(None);
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn create_list_and_update_routes_work() {
    let (app, state) = test_app(None);
    let mut events = state.api.subscribe();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/todos",
            serde_json::json!({ "name": "buy milk", "status": "new" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let created: TodoItem = read_json(response).await;
    assert_eq!(created.version, 1);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/todos/{}", created.id),
            serde_json::json!({ "name": "buy milk", "status": "done", "expected_version": 1 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let updated: TodoItem = read_json(response).await;
    assert_eq!(updated.status, TodoStatus::Done);
    assert_eq!(updated.version, 2);

    let response = app
        .oneshot(Request::get("/todos").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let listed: Vec<TodoItem> = read_json(response).await;
    assert_eq!(listed, vec![updated.clone()]);

    assert_eq!(
        events.try_recv().expect("created event"),
        ServerEvent::TodoCreated { item: created }
    );
    assert_eq!(
        events.try_recv().expect("updated event"),
        ServerEvent::TodoUpdated { item: updated }
    );
}

#[tokio::test]
async fn stale_update_returns_conflict_without_event() {
    let (app, state) = test_app(None);
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/todos",
            serde_json::json!({ "name": "a", "status": "new" }),
        ))
        .await
        .expect("response");
    let created: TodoItem = read_json(response).await;
    let mut events = state.api.subscribe();

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/todos/{}", created.id),
            serde_json::json!({ "name": "a", "status": "done", "expected_version": 4 }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error: ApiError = read_json(response).await;
    assert_eq!(error.code, ErrorCode::Conflict);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn unknown_todo_is_not_found() {
    let (app, _state) = test_app(None);
    let response = app
        .oneshot(json_request(
            "PUT",
            "/todos/77",
            serde_json::json!({ "name": "a", "status": "done", "expected_version": 1 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_name_is_rejected() {
    let (app, _state) = test_app(None);
    let response = app
        .oneshot(json_request(
            "POST",
            "/todos",
            serde_json::json!({ "name": "", "status": "new" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = read_json(response).await;
    assert_eq!(error.code, ErrorCode::Validation);
}

#[tokio::test]
async fn bearer_token_is_enforced_when_configured() {
    let (app, _state) = test_app(Some("s3cret"));

    let response = app
        .clone()
        .oneshot(Request::get("/todos").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::get("/todos")
                .header("authorization", "Bearer s3cret")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn new_status_is_rejected_outside_creation() {
    let (app, state) = test_app(None);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/todos",
            serde_json::json!({ "name": "a", "status": "done" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = read_json(response).await;
    assert_eq!(error.code, ErrorCode::Validation);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/todos",
            serde_json::json!({ "name": "a", "status": "new" }),
        ))
        .await
        .expect("response");
    let created: TodoItem = read_json(response).await;
    let mut events = state.api.subscribe();

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/todos/{}", created.id),
            serde_json::json!({ "name": "a", "status": "new", "expected_version": 1 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = read_json(response).await;
    assert_eq!(error.code, ErrorCode::Validation);
    assert!(events.try_recv().is_err());
}
