pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod harness;
pub mod middleware;
pub mod routes;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn api::UserApi>,
    pub config: Arc<config::AppConfig>,
}

impl AppState {
    /// State talking to the user API over HTTP, as configured.
    pub fn from_config(config: config::AppConfig) -> Self {
        let client = api::ApiClient::new(config.api_url.clone())
            .with_expected_version(config.api_version.clone());
        Self {
            api: Arc::new(api::HttpUserApi::new(client)),
            config: Arc::new(config),
        }
    }
}
