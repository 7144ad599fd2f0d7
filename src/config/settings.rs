use crate::api::client::parse_version;
use anyhow::{Context, Result};
use std::env;

/// Runtime configuration of the web front end.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the remote user API, without a trailing slash.
    pub api_url: String,
    /// API version the front end was written against, if pinned.
    pub api_version: Option<Vec<u32>>,
    pub host: String,
    pub port: u16,
    /// SQLite URL of the session store.
    pub database_url: String,
    pub slack_url: String,
    pub default_language: String,
}

impl AppConfig {
    /// Defaults for everything except the API location.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_version: None,
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "sqlite://data/sessions.db".to_string(),
            slack_url: "https://ossm.slack.com".to_string(),
            default_language: "en-AU".to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(
            env::var("API_URL").unwrap_or_else(|_| "http://localhost:8001".to_string()),
        );

        if let Ok(version) = env::var("API_VERSION") {
            config.api_version = Some(
                parse_version(&version)
                    .with_context(|| format!("Invalid API_VERSION '{}'", version))?,
            );
        }

        config.database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            config.port = port.parse().context("Invalid PORT")?;
        }
        if let Ok(slack_url) = env::var("SLACK_URL") {
            config.slack_url = slack_url;
        }
        if let Ok(language) = env::var("DEFAULT_LANGUAGE") {
            config.default_language = language;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let config = AppConfig::new("http://api.test");
        assert_eq!(config.api_url, "http://api.test");
        assert_eq!(config.port, 8080);
        assert_eq!(config.default_language, "en-AU");
        assert!(config.api_version.is_none());
    }
}
