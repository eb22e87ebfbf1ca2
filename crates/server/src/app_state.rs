use crate::api::ApiContext;

#[derive(Clone)]
pub struct AppState {
    pub api: ApiContext,
    pub auth_token: Option<String>,
}

impl AppState {
    pub fn new(api: ApiContext, auth_token: Option<String>) -> Self {
        Self { api, auth_token }
    }
}
