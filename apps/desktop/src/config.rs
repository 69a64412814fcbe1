use std::{collections::HashMap, fs};

pub const CONFIG_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub database_url: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            database_url: "sqlite://./data/client.db".into(),
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then `client.toml` in the working directory, then environment.
pub fn load_settings() -> Settings {
    let file = fs::read_to_string(CONFIG_FILE).ok();
    resolve_settings(file.as_deref(), |key| std::env::var(key).ok())
}

pub(crate) fn resolve_settings(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
            if let Some(v) = file_cfg.get("api_url") {
                settings.api_url = v.clone();
            }
            if let Some(v) = file_cfg.get("database_url") {
                settings.database_url = v.clone();
            }
            if let Some(v) = file_cfg.get("log_filter") {
                settings.log_filter = v.clone();
            }
        }
    }

    // prefixed names win over bare ones
    if let Some(v) = env("API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    settings
}

/// Falls back to the default location when the configured value is blank.
pub fn prepare_database_url(raw_database_url: &str) -> String {
    storage::normalize_database_url(raw_database_url)
        .unwrap_or_else(|| Settings::default().database_url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
