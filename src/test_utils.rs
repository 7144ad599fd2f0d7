pub mod test_helpers {
    use crate::api::UserApi;
    use crate::config::{
        session::{Environment, SessionConfig},
        AppConfig,
    };
    use crate::{routes, AppState};
    use axum::Router;
    use std::sync::Arc;
    use tower_sessions::MemoryStore;

    /// Configuration pointing at `api_url`, with an in-memory session database.
    pub fn test_config(api_url: &str) -> AppConfig {
        let mut config = AppConfig::new(api_url);
        config.database_url = "sqlite::memory:".to_string();
        config.slack_url = "https://slack.example.test".to_string();
        config
    }

    /// The full router against an HTTP user API at `api_url` (usually a
    /// wiremock server).
    pub fn test_app(api_url: &str) -> Router {
        let state = AppState::from_config(test_config(api_url));
        app_with_state(state)
    }

    /// The full router against any `UserApi` implementation.
    pub fn test_app_with_api(api: Arc<dyn UserApi>) -> Router {
        let state = AppState {
            api,
            config: Arc::new(test_config("http://127.0.0.1:9")),
        };
        app_with_state(state)
    }

    fn app_with_state(state: AppState) -> Router {
        let session_layer = SessionConfig::for_environment(Environment::Development)
            .create_layer(MemoryStore::default());
        routes::build_router(state, session_layer)
    }
}

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use serde::Serialize;
use std::collections::HashMap;
use tower::ServiceExt;

/// Pulls the value of the first `csrf_token` hidden input out of a page.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let marker = r#"name="csrf_token" value=""#;
    let start = html.find(marker)? + marker.len();
    let end = html[start..].find('"')?;
    Some(html[start..start + end].to_string())
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn contains(&self, text: &str) -> bool {
        self.body.contains(text)
    }
}

/// Drives a router like a browser: cookies set by responses are sent back
/// on later requests.
pub struct TestClient {
    router: Router,
    cookies: HashMap<String, String>,
}

impl TestClient {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            cookies: HashMap::new(),
        }
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    /// Current value of a cookie in the jar.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.get_with_headers(uri, &[]).await
    }

    pub async fn get_with_headers(&mut self, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn post_form<T: Serialize + ?Sized>(&mut self, uri: &str, form: &T) -> TestResponse {
        self.post_form_with_headers(uri, form, &[]).await
    }

    pub async fn post_form_with_headers<T: Serialize + ?Sized>(
        &mut self,
        uri: &str,
        form: &T,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let body = serde_urlencoded::to_string(form).unwrap();
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).unwrap();
        self.send(request).await
    }

    /// Loads `uri` and returns the CSRF token embedded in its form.
    pub async fn csrf_token(&mut self, uri: &str) -> String {
        let page = self.get(uri).await;
        extract_csrf_token(&page.body)
            .unwrap_or_else(|| panic!("no csrf_token field on {} ({})", uri, page.status))
    }

    async fn send(&mut self, mut request: Request<Body>) -> TestResponse {
        if !self.cookies.is_empty() {
            let cookie = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let response = self.router.clone().oneshot(request).await.unwrap();

        for set_cookie in response.headers().get_all(header::SET_COOKIE) {
            let Ok(set_cookie) = set_cookie.to_str() else {
                continue;
            };
            let pair = set_cookie.split(';').next().unwrap_or_default();
            if let Some((name, value)) = pair.split_once('=') {
                let expired = set_cookie.to_ascii_lowercase().contains("max-age=0");
                if expired || value.is_empty() {
                    self.cookies.remove(name.trim());
                } else {
                    self.cookies
                        .insert(name.trim().to_string(), value.trim().to_string());
                }
            }
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).to_string(),
        }
    }
}
