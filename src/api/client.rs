//! HTTP client for the remote user API
//!
//! This module forwards requests to the API base URL and hands back the raw
//! response. It does not retry, does not impose timeouts and does not translate
//! status codes: callers branch on `ApiResponse::status` themselves.
//!
//! # Example
//!
//! ```rust,no_run
//! use ossm_web::api::{auth_headers, ApiClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new("http://localhost:8001");
//!
//! let response = client
//!     .get("/user/1", Some(&auth_headers("ABCDEFabcdef12345678")?))
//!     .await?;
//!
//! if response.status == 404 {
//!     println!("no such user");
//! }
//! # Ok(())
//! # }
//! ```

use crate::api::models::{ApiFailure, Envelope};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{de::DeserializeOwned, Serialize};

/// Errors raised while talking to the remote API
///
/// Non-2xx status codes are NOT errors at this level; they come back as a
/// normal `ApiResponse`.
#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Response body is not valid JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("API version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

/// Raw response returned by the remote API
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code (e.g., 200, 400, 404)
    pub status: u16,
    /// Response body as received
    pub body: String,
    expected_version: Option<Vec<u32>>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            expected_version: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the whole body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiClientError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Unwraps the `{"version": ..., "data": ...}` envelope of a success body.
    ///
    /// When the client was built with an expected API version, a body carrying a
    /// different version is rejected.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, ApiClientError> {
        let envelope: Envelope<T> = self.json()?;

        if let (Some(expected), Some(actual)) = (&self.expected_version, &envelope.version) {
            if expected != actual {
                return Err(ApiClientError::VersionMismatch {
                    expected: format_version(expected),
                    actual: format_version(actual),
                });
            }
        }

        Ok(envelope.data)
    }

    /// Parses an error body into its `reason` discriminator.
    ///
    /// Bodies that are empty or not JSON are reported as `ApiFailure::Unknown`.
    pub fn failure(&self) -> ApiFailure {
        ApiFailure::from_body(&self.body)
    }
}

pub fn format_version(version: &[u32]) -> String {
    version
        .iter()
        .map(|part| part.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Parses a dotted version string such as `0.0.1`.
pub fn parse_version(value: &str) -> Option<Vec<u32>> {
    value
        .trim()
        .split('.')
        .map(|part| part.parse::<u32>().ok())
        .collect()
}

/// Builds the header map carrying a user's auth token.
///
/// The remote API expects the bare token in `Authorization`, without a scheme.
pub fn auth_headers(token: &str) -> Result<HeaderMap, ApiClientError> {
    let mut headers = HeaderMap::new();
    let value =
        HeaderValue::from_str(token).map_err(|e| ApiClientError::InvalidHeader(e.to_string()))?;
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// Thin wrapper over `reqwest::Client` bound to the API base URL
///
/// Safe to share across handlers; the underlying client pools connections.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    expected_version: Option<Vec<u32>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            expected_version: None,
        }
    }

    /// Pins the API version that `ApiResponse::data` accepts.
    pub fn with_expected_version(mut self, version: Option<Vec<u32>>) -> Self {
        self.expected_version = version;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issues `GET base_url + path`.
    pub async fn get(
        &self,
        path: &str,
        headers: Option<&HeaderMap>,
    ) -> Result<ApiResponse, ApiClientError> {
        let mut request = self.client.get(self.url(path));
        if let Some(headers) = headers {
            request = request.headers(headers.clone());
        }

        tracing::debug!("GET {}", path);
        let response = request.send().await?;
        self.into_api_response(response).await
    }

    /// Issues `POST base_url + path` with `data` sent form-urlencoded.
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        data: Option<&T>,
        headers: Option<&HeaderMap>,
    ) -> Result<ApiResponse, ApiClientError> {
        let mut request = self.client.post(self.url(path));
        if let Some(headers) = headers {
            request = request.headers(headers.clone());
        }
        if let Some(data) = data {
            request = request.form(data);
        }

        tracing::debug!("POST {}", path);
        let response = request.send().await?;
        self.into_api_response(response).await
    }

    async fn into_api_response(
        &self,
        response: reqwest::Response,
    ) -> Result<ApiResponse, ApiClientError> {
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(ApiResponse {
            status,
            body,
            expected_version: self.expected_version.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Pk {
        pk: i64,
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("0.0.1"), Some(vec![0, 0, 1]));
        assert_eq!(parse_version(" 1.2 "), Some(vec![1, 2]));
        assert_eq!(parse_version("1.x"), None);
    }

    #[test]
    fn test_data_unwraps_envelope() {
        let response = ApiResponse::new(200, r#"{"version":[0,0,1],"data":{"pk":5}}"#);
        let pk: Pk = response.data().unwrap();
        assert_eq!(pk.pk, 5);
    }

    #[test]
    fn test_data_rejects_other_version() {
        let mut response = ApiResponse::new(200, r#"{"version":[0,0,2],"data":{"pk":5}}"#);
        response.expected_version = Some(vec![0, 0, 1]);

        let result = response.data::<Pk>();
        assert!(matches!(
            result,
            Err(ApiClientError::VersionMismatch { ref expected, ref actual })
                if expected == "0.0.1" && actual == "0.0.2"
        ));
    }

    #[test]
    fn test_is_success_range() {
        assert!(ApiResponse::new(204, "").is_success());
        assert!(!ApiResponse::new(400, "").is_success());
    }

    #[test]
    fn test_auth_headers_sends_bare_token() {
        let headers = auth_headers("ABCDEFabcdef12345678").unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "ABCDEFabcdef12345678");
    }
}
