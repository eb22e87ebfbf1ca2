use shared::{
    domain::{TodoId, TodoItem},
    error::ApiException,
    protocol::{CreateTodoRequest, ServerEvent, UpdateTodoRequest},
};
use tokio::sync::broadcast;
use tracing::info;

use crate::store::TodoStore;

#[derive(Clone, Default)]
pub struct ApiContext {
    pub store: TodoStore,
}

impl ApiContext {
    pub fn new(event_buffer: usize) -> Self {
        Self {
            store: TodoStore::new(event_buffer),
        }
    }

    /// Feed of committed writes, in commit order.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.store.subscribe()
    }
}

pub async fn list_todos(ctx: &ApiContext) -> Vec<TodoItem> {
    ctx.store.list().await
}

/// Creates an item; subscribers receive a `TodoCreated` event for it.
pub async fn create_todo(
    ctx: &ApiContext,
    request: CreateTodoRequest,
) -> Result<TodoItem, ApiException> {
    let item = ctx.store.create(request).await?;
    info!(todo_id = item.id.0, "api: todo created");
    Ok(item)
}

pub async fn update_todo(
    ctx: &ApiContext,
    id: TodoId,
    request: UpdateTodoRequest,
) -> Result<TodoItem, ApiException> {
    let item = ctx.store.update(id, request).await?;
    info!(
        todo_id = item.id.0,
        version = item.version,
        status = %item.status,
        "api: todo updated"
    );
    Ok(item)
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
