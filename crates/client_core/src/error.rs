use shared::{
    domain::TodoId,
    error::{ApiError, ErrorCode},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server rejected request ({status}): {code:?}: {message}")]
    Api {
        status: u16,
        code: ErrorCode,
        message: String,
    },
    #[error("version conflict on todo {id}: {message}")]
    VersionConflict { id: TodoId, message: String },
    #[error("invalid response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("todo {0} is not in the local list")]
    UnknownItem(TodoId),
}

impl ClientError {
    pub(crate) fn from_api_error(status: u16, error: ApiError) -> Self {
        Self::Api {
            status,
            code: error.code,
            message: error.message,
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// True when `err` carries a [`ClientError::VersionConflict`] anywhere in its chain.
pub fn is_version_conflict(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ClientError>()
            .is_some_and(ClientError::is_version_conflict)
    })
}
