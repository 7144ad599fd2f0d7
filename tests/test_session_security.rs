use std::{collections::HashMap, env};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::get,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ossm_web::{
    config::{
        session::{validate_production_config, SessionConfig},
        AppConfig,
    },
    test_utils::{test_helpers, TestClient},
};
use serial_test::serial;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;
use tower_sessions::{cookie::SameSite, Session};
use tower_sessions_sqlx_store::SqliteStore;
use wiremock::MockServer;

#[derive(Default)]
struct EnvGuard {
    original: HashMap<String, Option<String>>,
}

impl EnvGuard {
    fn set(&mut self, key: &str, value: impl Into<String>) {
        self.original
            .entry(key.to_string())
            .or_insert_with(|| env::var(key).ok());
        env::set_var(key, value.into());
    }

    fn remove(&mut self, key: &str) {
        self.original
            .entry(key.to_string())
            .or_insert_with(|| env::var(key).ok());
        env::remove_var(key);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.original.drain() {
            match value {
                Some(v) => env::set_var(&key, v),
                None => env::remove_var(&key),
            }
        }
    }
}

async fn issued_cookie(config: SessionConfig) -> tower_sessions::cookie::Cookie<'static> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let session_store = SqliteStore::new(pool)
        .with_table_name("sessions_test")
        .expect("valid session table name for tests");
    session_store
        .migrate()
        .await
        .expect("session table migration to succeed");

    let session_layer = config.create_layer(session_store);

    async fn set_session(session: Session) -> &'static str {
        session.insert("csrf", "token").await.unwrap();
        "ok"
    }

    let app = Router::new().route("/", get(set_session)).layer(session_layer);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .body(Body::empty())
                .expect("request to build"),
        )
        .await
        .expect("router to respond");

    let cookie_header = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie to be issued")
        .to_str()
        .expect("cookie header to be valid ASCII")
        .to_string();

    tower_sessions::cookie::Cookie::parse(cookie_header).expect("cookie header to parse correctly")
}

#[tokio::test]
#[serial]
async fn session_cookie_flags_are_secure_in_production() {
    let mut env_guard = EnvGuard::default();
    env_guard.set("ENVIRONMENT", "production");
    env_guard.set("FORCE_HTTPS", "true");
    let secret = STANDARD.encode([42u8; 64]);
    env_guard.set("SESSION_SECRET", secret);

    validate_production_config().unwrap();

    let cookie = issued_cookie(SessionConfig::from_env()).await;

    assert_eq!(cookie.name(), "__Host-session", "cookie name should be hardened");
    assert_eq!(cookie.http_only(), Some(true), "HttpOnly flag must be set");
    assert_eq!(cookie.secure(), Some(true), "Secure flag must be enabled");
    assert_eq!(cookie.same_site(), Some(SameSite::Strict));
    assert_eq!(
        cookie.path().unwrap_or("/"),
        "/",
        "cookie path must be root for __Host- prefix"
    );
}

#[tokio::test]
#[serial]
async fn development_cookie_is_lax() {
    let mut env_guard = EnvGuard::default();
    env_guard.remove("ENVIRONMENT");

    let cookie = issued_cookie(SessionConfig::from_env()).await;

    assert!(validate_production_config().is_ok());
    assert_eq!(cookie.name(), "session");
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
}

#[test]
#[serial]
fn production_requires_https_flag() {
    let mut env_guard = EnvGuard::default();
    env_guard.set("ENVIRONMENT", "production");
    env_guard.remove("FORCE_HTTPS");
    env_guard.set("SESSION_SECRET", "a".repeat(64));

    let err = validate_production_config().unwrap_err();
    assert!(err.to_string().contains("FORCE_HTTPS"));
}

#[test]
#[serial]
fn production_rejects_weak_secrets() {
    let mut env_guard = EnvGuard::default();
    env_guard.set("ENVIRONMENT", "production");
    env_guard.set("FORCE_HTTPS", "true");
    env_guard.set("SESSION_SECRET", "changeme");

    assert!(
        validate_production_config().is_err(),
        "weak session secrets must be refused in production"
    );

    env_guard.set("SESSION_SECRET", format!("changeme{}", "x".repeat(64)));
    assert!(validate_production_config().is_err());
}

#[tokio::test]
#[serial]
async fn hsts_only_in_production() {
    let server = MockServer::start().await;
    let mut env_guard = EnvGuard::default();

    env_guard.remove("ENVIRONMENT");
    let mut client = TestClient::new(test_helpers::test_app(&server.uri()));
    let page = client.get("/").await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(!page.headers.contains_key("strict-transport-security"));

    env_guard.set("ENVIRONMENT", "production");
    let page = client.get("/").await;
    assert!(page.headers.contains_key("strict-transport-security"));
}

#[test]
#[serial]
fn app_config_reads_environment() {
    let mut env_guard = EnvGuard::default();
    env_guard.set("API_URL", "http://api.ossm.test:9000");
    env_guard.set("API_VERSION", "0.0.1");
    env_guard.set("DATABASE_URL", "sqlite://tmp/sessions.db");
    env_guard.set("PORT", "9090");
    env_guard.set("SLACK_URL", "https://team.slack.test");
    env_guard.remove("HOST");
    env_guard.remove("DEFAULT_LANGUAGE");

    let config = AppConfig::from_env().unwrap();
    assert_eq!(config.api_url, "http://api.ossm.test:9000");
    assert_eq!(config.api_version, Some(vec![0, 0, 1]));
    assert_eq!(config.port, 9090);
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.slack_url, "https://team.slack.test");
    assert_eq!(config.default_language, "en-AU");
}

#[test]
#[serial]
fn app_config_requires_database_url() {
    let mut env_guard = EnvGuard::default();
    env_guard.remove("DATABASE_URL");

    assert!(AppConfig::from_env().is_err());
}

#[test]
#[serial]
fn app_config_rejects_bad_api_version() {
    let mut env_guard = EnvGuard::default();
    env_guard.set("DATABASE_URL", "sqlite://tmp/sessions.db");
    env_guard.set("API_VERSION", "one.two");

    assert!(AppConfig::from_env().is_err());
}
