use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use shared::{
    domain::{TodoId, TodoItem, TodoStatus},
    protocol::{ServerEvent, UpdateTodoRequest},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
};
use tracing::{debug, info, warn};

pub mod config;
pub mod draft;
pub mod error;
pub mod http;
pub mod reconciler;

pub use config::{load_client_config, ClientConfig};
pub use draft::DraftInput;
pub use error::{is_version_conflict, ClientError};
pub use http::HttpTodoApi;
pub use reconciler::{ApplyOutcome, TodoList};

const EVENT_BUFFER: usize = 256;

/// Remote store of to-do items. Every returned item is the store's
/// authoritative record, including the identity and version it assigned.
#[async_trait]
pub trait TodoApi: Send + Sync {
    async fn list_todos(&self) -> Result<Vec<TodoItem>>;
    async fn create_todo(&self, name: &str, status: TodoStatus) -> Result<TodoItem>;
    async fn update_todo(&self, id: TodoId, request: &UpdateTodoRequest) -> Result<TodoItem>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    ItemsChanged(Vec<TodoItem>),
    Error(String),
    RealtimeStopped,
}

#[derive(Default)]
struct TodoClientState {
    list: TodoList,
    realtime_started: bool,
    /// Feed records seen while a load is in flight; replayed over its result.
    seen_during_load: Option<Vec<TodoItem>>,
}

impl TodoClientState {
    fn record_feed(&mut self, item: &TodoItem) {
        if let Some(seen) = self.seen_during_load.as_mut() {
            seen.push(item.clone());
        }
    }

    /// Replaces the list with `items`, then reapplies feed records the fetched
    /// list predates: missing identities are appended and records newer than
    /// the fetched version replace it.
    fn finish_load(&mut self, items: Vec<TodoItem>) {
        self.list.load(items);
        for item in self.seen_during_load.take().unwrap_or_default() {
            let stale = self
                .list
                .find(item.id)
                .map_or(true, |current| current.version < item.version);
            if stale {
                self.list.upsert(item);
            }
        }
    }
}

/// Keeps the local list in step with the remote store.
///
/// Local state only changes after the store confirms a write; failed calls
/// leave the list untouched and are reported on the event channel.
pub struct TodoClient {
    api: Arc<dyn TodoApi>,
    inner: Mutex<TodoClientState>,
    events: broadcast::Sender<ClientEvent>,
}

impl TodoClient {
    pub fn new(api: Arc<dyn TodoApi>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            api,
            inner: Mutex::new(TodoClientState::default()),
            events,
        })
    }

    pub fn connect(config: ClientConfig) -> Result<Arc<Self>> {
        let api = HttpTodoApi::new(config)?;
        Ok(Self::new(Arc::new(api)))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Vec<TodoItem> {
        self.inner.lock().await.list.snapshot().to_vec()
    }

    pub async fn find(&self, id: TodoId) -> Option<TodoItem> {
        self.inner.lock().await.list.find(id).cloned()
    }

    /// Fetches every item and replaces the local list with the result.
    /// Realtime records applied while the fetch is in flight survive it.
    pub async fn load(&self) -> Result<Vec<TodoItem>> {
        {
            let mut guard = self.inner.lock().await;
            if guard.seen_during_load.is_none() {
                guard.seen_during_load = Some(Vec::new());
            }
        }
        let items = match self.api.list_todos().await {
            Ok(items) => items,
            Err(err) => {
                self.inner.lock().await.seen_during_load = None;
                return Err(self.report_failure("load", err));
            }
        };
        let count = items.len();
        let snapshot = {
            let mut guard = self.inner.lock().await;
            guard.finish_load(items);
            guard.list.snapshot().to_vec()
        };
        info!(count, "todo: loaded list");
        let _ = self.events.send(ClientEvent::ItemsChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Creates an item named `name`. An empty name is ignored without
    /// contacting the store.
    pub async fn create(&self, name: &str) -> Result<Option<TodoItem>> {
        if name.is_empty() {
            debug!("todo: ignoring empty item name");
            return Ok(None);
        }
        let item = match self.api.create_todo(name, TodoStatus::New).await {
            Ok(item) => item,
            Err(err) => return Err(self.report_failure("create", err)),
        };
        info!(todo_id = item.id.0, version = item.version, "todo: created");
        self.apply(|state| state.list.append(item.clone())).await;
        Ok(Some(item))
    }

    /// Submits the draft field. The field is cleared as soon as submission
    /// starts, whatever the outcome of the request.
    pub async fn submit(&self, draft: &mut DraftInput) -> Result<Option<TodoItem>> {
        let Some(name) = draft.take_submission() else {
            return Ok(None);
        };
        self.create(&name).await
    }

    /// Checkbox handler: marks the item done when `checked`, not done otherwise.
    pub async fn set_done(&self, id: TodoId, checked: bool) -> Result<TodoItem> {
        let current = self
            .find(id)
            .await
            .ok_or(ClientError::UnknownItem(id))?;
        let request = UpdateTodoRequest {
            name: current.name,
            status: TodoStatus::from_checked(checked),
            expected_version: current.version,
        };
        let item = match self.api.update_todo(id, &request).await {
            Ok(item) => item,
            Err(err) => return Err(self.report_failure("update", err)),
        };
        info!(
            todo_id = item.id.0,
            status = %item.status,
            version = item.version,
            "todo: updated"
        );
        self.apply(|state| state.list.upsert(item.clone())).await;
        Ok(item)
    }

    /// Flips the checkbox of `id` relative to its current local state.
    pub async fn toggle(&self, id: TodoId) -> Result<TodoItem> {
        let current = self
            .find(id)
            .await
            .ok_or(ClientError::UnknownItem(id))?;
        self.set_done(id, !current.status.is_done()).await
    }

    pub async fn apply_server_event(&self, event: ServerEvent) -> ApplyOutcome {
        match event {
            ServerEvent::TodoCreated { item } => {
                debug!(todo_id = item.id.0, "todo: realtime create");
                self.apply(|state| {
                    state.record_feed(&item);
                    state.list.append(item)
                })
                .await
            }
            ServerEvent::TodoUpdated { item } => {
                debug!(todo_id = item.id.0, version = item.version, "todo: realtime update");
                self.apply(|state| {
                    state.record_feed(&item);
                    state.list.upsert(item)
                })
                .await
            }
            ServerEvent::Error(error) => {
                warn!(code = ?error.code, message = %error.message, "todo: server reported error");
                let _ = self.events.send(ClientEvent::Error(format!(
                    "server error: {:?}: {}",
                    error.code, error.message
                )));
                ApplyOutcome::Unchanged
            }
        }
    }

    /// Connects to the realtime feed and applies its events in arrival order
    /// until the server closes the connection.
    pub async fn spawn_realtime(self: &Arc<Self>, config: &ClientConfig) -> Result<JoinHandle<()>> {
        {
            let mut guard = self.inner.lock().await;
            if guard.realtime_started {
                return Err(anyhow!("realtime feed already running"));
            }
            guard.realtime_started = true;
        }

        let ws_stream = match connect_realtime(config).await {
            Ok(stream) => stream,
            Err(err) => {
                self.inner.lock().await.realtime_started = false;
                return Err(err);
            }
        };
        let (_, mut ws_reader) = ws_stream.split();
        info!(endpoint = %config.endpoint, "todo: realtime feed connected");

        let client = Arc::clone(self);
        Ok(tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            client.apply_server_event(event).await;
                        }
                        Err(err) => {
                            warn!(%err, "todo: undecodable realtime event");
                            let _ = client
                                .events
                                .send(ClientEvent::Error(format!("invalid server event: {err}")));
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        let _ = client.events.send(ClientEvent::Error(format!(
                            "websocket receive failed: {err}"
                        )));
                        break;
                    }
                }
            }
            client.inner.lock().await.realtime_started = false;
            info!("todo: realtime feed stopped");
            let _ = client.events.send(ClientEvent::RealtimeStopped);
        }))
    }

    async fn apply(&self, op: impl FnOnce(&mut TodoClientState) -> ApplyOutcome) -> ApplyOutcome {
        let (outcome, snapshot) = {
            let mut guard = self.inner.lock().await;
            let outcome = op(&mut *guard);
            let snapshot = outcome.changed().then(|| guard.list.snapshot().to_vec());
            (outcome, snapshot)
        };
        if let Some(items) = snapshot {
            let _ = self.events.send(ClientEvent::ItemsChanged(items));
        }
        outcome
    }

    fn report_failure(&self, operation: &'static str, err: anyhow::Error) -> anyhow::Error {
        if is_version_conflict(&err) {
            warn!(operation, error = %err, "todo: rejected by version check");
        } else {
            warn!(operation, error = %err, "todo: remote call failed");
        }
        let _ = self
            .events
            .send(ClientEvent::Error(format!("{operation} failed: {err}")));
        err.context(format!("todo {operation} failed"))
    }
}

async fn connect_realtime(
    config: &ClientConfig,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
> {
    let url = config.realtime_url()?;
    let mut request = url
        .as_str()
        .into_client_request()
        .with_context(|| format!("invalid websocket url: {url}"))?;
    if let Some(token) = &config.auth_token {
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    }
    let (ws_stream, _) = connect_async(request)
        .await
        .with_context(|| format!("failed to connect websocket: {url}"))?;
    Ok(ws_stream)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
