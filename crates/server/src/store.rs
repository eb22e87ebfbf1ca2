use std::sync::Arc;

use shared::{
    domain::{TodoId, TodoItem, TodoStatus},
    error::{ApiException, ErrorCode},
    protocol::{CreateTodoRequest, ServerEvent, UpdateTodoRequest},
};
use tokio::sync::{broadcast, RwLock};

pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// In-memory item table. Identities are assigned sequentially from 1 and
/// every successful write bumps the item's version.
///
/// Each committed write is published to subscribers before the write lock is
/// released, so the event order always matches the commit order.
#[derive(Clone)]
pub struct TodoStore {
    inner: Arc<RwLock<StoreState>>,
    events: broadcast::Sender<ServerEvent>,
}

#[derive(Default)]
struct StoreState {
    items: Vec<TodoItem>,
    last_id: i64,
}

impl Default for TodoStore {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl TodoStore {
    pub fn new(event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            inner: Arc::default(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub async fn list(&self) -> Vec<TodoItem> {
        self.inner.read().await.items.clone()
    }

    pub async fn create(&self, request: CreateTodoRequest) -> Result<TodoItem, ApiException> {
        validate_name(&request.name)?;
        if request.status != TodoStatus::New {
            return Err(ApiException::new(
                ErrorCode::Validation,
                format!("items are created as 'new', not '{}'", request.status),
            ));
        }
        let mut guard = self.inner.write().await;
        guard.last_id += 1;
        let item = TodoItem {
            id: TodoId(guard.last_id),
            name: request.name,
            status: request.status,
            version: 1,
        };
        guard.items.push(item.clone());
        let _ = self.events.send(ServerEvent::TodoCreated { item: item.clone() });
        Ok(item)
    }

    pub async fn update(
        &self,
        id: TodoId,
        request: UpdateTodoRequest,
    ) -> Result<TodoItem, ApiException> {
        validate_name(&request.name)?;
        if request.status == TodoStatus::New {
            return Err(ApiException::new(
                ErrorCode::Validation,
                "status can only change to 'done' or 'not done'",
            ));
        }
        let mut guard = self.inner.write().await;
        let stored = guard
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| ApiException::new(ErrorCode::NotFound, format!("todo {id} not found")))?;
        if stored.version != request.expected_version {
            return Err(ApiException::new(
                ErrorCode::Conflict,
                format!(
                    "todo {id} is at version {}, update expected {}",
                    stored.version, request.expected_version
                ),
            ));
        }
        stored.name = request.name;
        stored.status = request.status;
        stored.version += 1;
        let item = stored.clone();
        let _ = self.events.send(ServerEvent::TodoUpdated { item: item.clone() });
        Ok(item)
    }
}

fn validate_name(name: &str) -> Result<(), ApiException> {
    if name.is_empty() {
        return Err(ApiException::new(ErrorCode::Validation, "name must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request(name: &str) -> CreateTodoRequest {
        CreateTodoRequest {
            name: name.to_string(),
            status: TodoStatus::New,
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids_and_keeps_insertion_order() {
        let store = TodoStore::default();
        store.create(create_request("a")).await.expect("a");
        store.create(create_request("b")).await.expect("b");

        let ids: Vec<i64> = store.list().await.iter().map(|item| item.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn update_checks_expected_version_and_bumps_it() {
        let store = TodoStore::default();
        let item = store.create(create_request("a")).await.expect("create");

        let updated = store
            .update(
                item.id,
                UpdateTodoRequest {
                    name: "a".into(),
                    status: TodoStatus::Done,
                    expected_version: 1,
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.version, 2);

        let stale = store
            .update(
                item.id,
                UpdateTodoRequest {
                    name: "a".into(),
                    status: TodoStatus::NotDone,
                    expected_version: 1,
                },
            )
            .await
            .expect_err("stale version");
        assert_eq!(stale.code, ErrorCode::Conflict);
        assert_eq!(store.list().await[0].status, TodoStatus::Done);
    }

    #[tokio::test]
    async fn rejects_empty_names_and_unknown_ids() {
        let store = TodoStore::default();
        let err = store.create(create_request("")).await.expect_err("empty");
        assert_eq!(err.code, ErrorCode::Validation);

        let err = store
            .update(
                TodoId(9),
                UpdateTodoRequest {
                    name: "x".into(),
                    status: TodoStatus::Done,
                    expected_version: 1,
                },
            )
            .await
            .expect_err("unknown");
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn new_status_is_only_accepted_at_creation() {
        let store = TodoStore::default();
        let err = store
            .create(CreateTodoRequest {
                name: "x".into(),
                status: TodoStatus::Done,
            })
            .await
            .expect_err("created as done");
        assert_eq!(err.code, ErrorCode::Validation);
        assert!(store.list().await.is_empty());

        let item = store.create(create_request("x")).await.expect("create");
        let err = store
            .update(
                item.id,
                UpdateTodoRequest {
                    name: "x".into(),
                    status: TodoStatus::New,
                    expected_version: 1,
                },
            )
            .await
            .expect_err("reset to new");
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(store.list().await, vec![item]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn events_follow_commit_order() {
        let store = TodoStore::default();
        let mut events = store.subscribe();
        let item = store.create(create_request("a")).await.expect("create");
        let id = item.id;

        let writers: Vec<_> = [TodoStatus::Done, TodoStatus::NotDone]
            .into_iter()
            .enumerate()
            .map(|(offset, status)| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update(
                            id,
                            UpdateTodoRequest {
                                name: "a".into(),
                                status,
                                expected_version: 1 + offset as u64,
                            },
                        )
                        .await
                })
            })
            .collect();
        for writer in writers {
            let _ = writer.await.expect("join");
        }

        assert_eq!(
            events.try_recv().expect("created"),
            ServerEvent::TodoCreated { item }
        );
        let mut last_version = 1;
        while let Ok(event) = events.try_recv() {
            let ServerEvent::TodoUpdated { item } = event else {
                panic!("unexpected event {event:?}");
            };
            assert!(item.version > last_version);
            last_version = item.version;
        }
        assert_eq!(store.list().await[0].version, last_version);
    }
}
