use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, RequestBuilder, Response, StatusCode,
};
use serde::de::DeserializeOwned;
use shared::{
    domain::{TodoId, TodoItem, TodoStatus},
    error::{ApiError, ErrorCode},
    protocol::{CreateTodoRequest, UpdateTodoRequest},
};
use tracing::debug;

use crate::{config::ClientConfig, error::ClientError, TodoApi};

pub const REGION_HEADER: &str = "x-todo-region";

/// [`TodoApi`] over the JSON HTTP routes of the backend.
pub struct HttpTodoApi {
    http: Client,
    config: ClientConfig,
}

impl HttpTodoApi {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        }
        if let Some(region) = &config.region {
            headers.insert(REGION_HEADER, HeaderValue::from_str(region)?);
        }
        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        url: String,
        request: RequestBuilder,
        conflict_id: Option<TodoId>,
    ) -> Result<T, ClientError> {
        let response = request.send().await.map_err(|source| ClientError::Transport {
            url: url.clone(),
            source,
        })?;
        let status = response.status();
        debug!(%url, status = status.as_u16(), "todo api response");
        if !status.is_success() {
            return Err(error_from_response(response, conflict_id).await);
        }
        response
            .json()
            .await
            .map_err(|source| ClientError::Decode { url, source })
    }
}

async fn error_from_response(response: Response, conflict_id: Option<TodoId>) -> ClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        let code = match status {
            StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
            StatusCode::FORBIDDEN => ErrorCode::Forbidden,
            StatusCode::NOT_FOUND => ErrorCode::NotFound,
            StatusCode::CONFLICT => ErrorCode::Conflict,
            StatusCode::TOO_MANY_REQUESTS => ErrorCode::RateLimited,
            s if s.is_client_error() => ErrorCode::Validation,
            _ => ErrorCode::Internal,
        };
        ApiError::new(code, body)
    });

    match (error.code, conflict_id) {
        (ErrorCode::Conflict, Some(id)) => ClientError::VersionConflict {
            id,
            message: error.message,
        },
        _ => ClientError::from_api_error(status.as_u16(), error),
    }
}

#[async_trait]
impl TodoApi for HttpTodoApi {
    async fn list_todos(&self) -> anyhow::Result<Vec<TodoItem>> {
        let url = self.config.http_url("/todos");
        let items = self
            .send_json(url.clone(), self.http.get(&url), None)
            .await?;
        Ok(items)
    }

    async fn create_todo(&self, name: &str, status: TodoStatus) -> anyhow::Result<TodoItem> {
        let url = self.config.http_url("/todos");
        let request = self.http.post(&url).json(&CreateTodoRequest {
            name: name.to_string(),
            status,
        });
        Ok(self.send_json(url, request, None).await?)
    }

    async fn update_todo(
        &self,
        id: TodoId,
        request: &UpdateTodoRequest,
    ) -> anyhow::Result<TodoItem> {
        let url = self.config.http_url(&format!("/todos/{id}"));
        let builder = self.http.put(&url).json(request);
        Ok(self.send_json(url, builder, Some(id)).await?)
    }
}
