use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;

pub const DEFAULT_SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    /// When set, every route except `/healthz` requires `Authorization: Bearer <token>`.
    pub auth_token: Option<String>,
    pub event_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8480".into(),
            auth_token: None,
            event_buffer: 256,
        }
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_with(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(&raw)
            .with_context(|| format!("failed to parse '{}'", path.display()))?;
        if let Some(v) = file_cfg.get("bind_addr").and_then(toml::Value::as_str) {
            settings.server_bind = v.to_string();
        }
        if let Some(v) = file_cfg.get("auth_token").and_then(toml::Value::as_str) {
            settings.auth_token = Some(v.to_string());
        }
        if let Some(v) = file_cfg.get("event_buffer").and_then(toml::Value::as_integer) {
            settings.event_buffer = usize::try_from(v).context("event_buffer must be positive")?;
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("APP__AUTH_TOKEN") {
        settings.auth_token = Some(v).filter(|token| !token.is_empty());
    }

    if let Some(v) = env("APP__EVENT_BUFFER") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.event_buffer = parsed;
        }
    }

    if settings.event_buffer == 0 {
        settings.event_buffer = Settings::default().event_buffer;
    }

    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
