use serde::{Deserialize, Serialize};

use crate::{
    domain::{TodoItem, TodoStatus},
    error::ApiError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTodoRequest {
    pub name: String,
    pub status: TodoStatus,
}

/// Full replacement of an item's mutable fields, guarded by the version the
/// caller last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTodoRequest {
    pub name: String,
    pub status: TodoStatus,
    pub expected_version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    TodoCreated { item: TodoItem },
    TodoUpdated { item: TodoItem },
    Error(ApiError),
}
