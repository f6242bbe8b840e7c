use std::{collections::HashMap, fs, io, path::Path, time::Duration};

use anyhow::{bail, Context};
use tracing::warn;
use url::Url;

pub const SETTINGS_FILE: &str = "dashboard.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub session_database_url: String,
    pub request_timeout_secs: u64,
    pub search_debounce_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080/api".into(),
            session_database_url: "sqlite://./data/dashboard.db".into(),
            request_timeout_secs: 30,
            search_debounce_ms: 300,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = Url::parse(&self.server_url)
            .with_context(|| format!("invalid server url '{}'", self.server_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("server url '{}' must use http or https", self.server_url);
        }
        if self.session_database_url.trim().is_empty() {
            bail!("session database url must not be empty");
        }
        if self.request_timeout_secs == 0 {
            bail!("request timeout must be at least one second");
        }
        Ok(())
    }
}

/// Defaults, then `dashboard.toml` in the working directory, then the
/// environment.
pub fn load_settings() -> anyhow::Result<ClientSettings> {
    load_settings_with(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(&raw)
                .with_context(|| format!("failed to parse '{}'", path.display()))?;
            apply_file(&mut settings, &file_cfg);
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()));
        }
    }

    if let Some(v) = env("DASHBOARD_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = env("DASHBOARD_SESSION_DB") {
        settings.session_database_url = v;
    }
    if let Some(v) = env("APP__SESSION_DB") {
        settings.session_database_url = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        set_number(&mut settings.request_timeout_secs, "APP__REQUEST_TIMEOUT_SECS", &v);
    }
    if let Some(v) = env("APP__SEARCH_DEBOUNCE_MS") {
        set_number(&mut settings.search_debounce_ms, "APP__SEARCH_DEBOUNCE_MS", &v);
    }

    Ok(settings)
}

fn apply_file(settings: &mut ClientSettings, file_cfg: &HashMap<String, toml::Value>) {
    if let Some(v) = file_cfg.get("server_url").and_then(as_text) {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.get("session_database_url").and_then(as_text) {
        settings.session_database_url = v;
    }
    if let Some(v) = file_cfg.get("request_timeout_secs").and_then(as_text) {
        set_number(&mut settings.request_timeout_secs, "request_timeout_secs", &v);
    }
    if let Some(v) = file_cfg.get("search_debounce_ms").and_then(as_text) {
        set_number(&mut settings.search_debounce_ms, "search_debounce_ms", &v);
    }
}

fn as_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn set_number(target: &mut u64, key: &str, raw: &str) {
    match raw.trim().parse::<u64>() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!(key, value = raw, "settings: ignoring non-numeric value"),
    }
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
