use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "todo.toml";

/// Connection settings for the remote to-do backend. Built once at startup
/// and handed to the HTTP client and the realtime feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub region: Option<String>,
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8480".into(),
            region: None,
            auth_token: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    endpoint: Option<String>,
    region: Option<String>,
    auth_token: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.endpoint)
            .with_context(|| format!("invalid endpoint '{}'", self.endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("endpoint must start with http:// or https://");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint.trim_end_matches('/'))
    }

    /// Websocket URL of the realtime feed: the endpoint with `http` swapped for
    /// `ws` (or `https` for `wss`) and `/ws` appended.
    pub fn realtime_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.http_url("/ws"))
            .with_context(|| format!("invalid endpoint '{}'", self.endpoint))?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            _ => return Err(anyhow!("endpoint must start with http:// or https://")),
        };
        url.set_scheme(scheme)
            .map_err(|()| anyhow!("cannot derive websocket url from '{}'", self.endpoint))?;
        Ok(url)
    }
}

/// Defaults, then the TOML file, then environment overrides.
///
/// A missing file is only an error when `path` was given explicitly.
pub fn load_client_config(path: Option<&Path>) -> Result<ClientConfig> {
    load_client_config_with(path, |key| std::env::var(key).ok())
}

pub fn load_client_config_with(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig> {
    let mut config = ClientConfig::default();

    let file_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(&file_path) {
        Ok(raw) => {
            let file_cfg: FileConfig = toml::from_str(&raw)
                .with_context(|| format!("failed to parse '{}'", file_path.display()))?;
            apply_file_config(&mut config, file_cfg);
        }
        Err(err) if path.is_some() => {
            return Err(err)
                .with_context(|| format!("failed to read '{}'", file_path.display()));
        }
        Err(_) => {}
    }

    if let Some(v) = env("TODO_ENDPOINT") {
        config.endpoint = v;
    }
    if let Some(v) = env("APP__ENDPOINT") {
        config.endpoint = v;
    }

    if let Some(v) = env("TODO_REGION") {
        config.region = Some(v);
    }
    if let Some(v) = env("APP__REGION") {
        config.region = Some(v);
    }

    if let Some(v) = env("TODO_AUTH_TOKEN") {
        config.auth_token = Some(v);
    }
    if let Some(v) = env("APP__AUTH_TOKEN") {
        config.auth_token = Some(v);
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        config.request_timeout_secs = v
            .parse()
            .with_context(|| format!("APP__REQUEST_TIMEOUT_SECS is not a number: '{v}'"))?;
    }

    config.validate()?;
    Ok(config)
}

fn apply_file_config(config: &mut ClientConfig, file_cfg: FileConfig) {
    if let Some(v) = file_cfg.endpoint {
        config.endpoint = v;
    }
    if file_cfg.region.is_some() {
        config.region = file_cfg.region;
    }
    if file_cfg.auth_token.is_some() {
        config.auth_token = file_cfg.auth_token;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        config.request_timeout_secs = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
