use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, Path, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, put},
    Json, Router,
};
use shared::{
    domain::{TodoId, TodoItem},
    error::{ApiError, ErrorCode},
    protocol::{CreateTodoRequest, ServerEvent, UpdateTodoRequest},
};
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, warn};

use crate::{
    api::{create_todo, list_todos, update_todo},
    AppState,
};

const MAX_BODY_BYTES: usize = 64 * 1024;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/todos", get(http_list_todos).post(http_create_todo))
        .route("/todos/:todo_id", put(http_update_todo))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_list_todos(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<TodoItem>>> {
    authorize(&state, &headers)?;
    Ok(Json(list_todos(&state.api).await))
}

async fn http_create_todo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTodoRequest>,
) -> ApiResult<Json<TodoItem>> {
    authorize(&state, &headers)?;
    let item = create_todo(&state.api, req)
        .await
        .map_err(|err| reject(err.into()))?;
    Ok(Json(item))
}

async fn http_update_todo(
    State(state): State<Arc<AppState>>,
    Path(todo_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<UpdateTodoRequest>,
) -> ApiResult<Json<TodoItem>> {
    authorize(&state, &headers)?;
    let item = update_todo(&state.api, TodoId(todo_id), req)
        .await
        .map_err(|err| reject(err.into()))?;
    Ok(Json(item))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    authorize(&state, &headers)?;
    // Subscribe before the upgrade completes so nothing published after the
    // handshake is missed.
    let events_rx = state.api.subscribe();
    Ok(ws.on_upgrade(move |socket| ws_connection(socket, events_rx)))
}

async fn ws_connection(socket: WebSocket, mut events_rx: broadcast::Receiver<ServerEvent>) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "ws: subscriber lagged behind event feed");
                    ServerEvent::Error(ApiError::new(
                        ErrorCode::Internal,
                        format!("{skipped} events were dropped; reload to resync"),
                    ))
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    debug!("ws: subscriber disconnected");
    send_task.abort();
}

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.auth_token.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(reject(ApiError::new(
            ErrorCode::Unauthorized,
            "missing or invalid bearer token",
        )))
    }
}

fn reject(error: ApiError) -> (StatusCode, Json<ApiError>) {
    (status_for(error.code), Json(error))
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
