use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CSRF_TOKEN_KEY: &str = "csrf_token";
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Shown on a re-rendered form when its token did not check out.
pub const CSRF_FAILURE_MESSAGE: &str =
    "Invalid security token. Please refresh the page and try again.";

const TOKEN_LIFETIME_SECS: i64 = 86400;

/// Request extension set once `X-CSRF-Token` has been validated (and the
/// session token rotated) by `csrf_validation_middleware`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsrfVerified;

/// CSRF token as stored in the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfToken {
    pub value: String,
    pub created_at: i64,
}

impl CsrfToken {
    pub fn new() -> Self {
        Self {
            value: Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Tokens live for 24 hours.
    pub fn is_expired(&self) -> bool {
        let age = chrono::Utc::now().timestamp() - self.created_at;
        age > TOKEN_LIFETIME_SECS
    }
}

impl Default for CsrfToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Leading characters of a token, safe to log.
fn prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

/// Generate a new CSRF token and store it in the session
pub async fn generate_csrf_token(
    session: &Session,
) -> Result<String, tower_sessions::session::Error> {
    let token = CsrfToken::new();
    let value = token.value.clone();

    session.insert(CSRF_TOKEN_KEY, token).await?;

    debug!("Generated new CSRF token: {}", prefix(&value));
    Ok(value)
}

/// Get the session's CSRF token, creating one if it is missing or expired
pub async fn get_or_create_csrf_token(
    session: &Session,
) -> Result<String, tower_sessions::session::Error> {
    let token: Option<CsrfToken> = session.get(CSRF_TOKEN_KEY).await?;

    match token {
        Some(existing) if !existing.is_expired() => Ok(existing.value),
        _ => generate_csrf_token(session).await,
    }
}

async fn stored_token(session: &Session) -> Result<CsrfToken, StatusCode> {
    let stored: Option<CsrfToken> = session.get(CSRF_TOKEN_KEY).await.map_err(|e| {
        warn!("Failed to get CSRF token from session: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match stored {
        Some(token) if token.is_expired() => {
            warn!("CSRF token expired");
            Err(StatusCode::FORBIDDEN)
        }
        Some(token) => Ok(token),
        None => {
            warn!("No CSRF token in session");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// Validates `X-CSRF-Token` on state-changing requests that carry it.
///
/// Browser forms submit the token as a form field instead; those requests
/// pass through and the handler calls `check_form_token`.
pub async fn csrf_validation_middleware(
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let method = request.method().clone();

    if matches!(method, Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let Some(provided) = provided else {
        return Ok(next.run(request).await);
    };

    debug!("Validating CSRF header for {} {}", method, request.uri().path());
    check_and_rotate(&session, &provided).await?;
    request.extensions_mut().insert(CsrfVerified);

    Ok(next.run(request).await)
}

/// Checks a token submitted as the `csrf_token` form field.
pub async fn validate_csrf_form_field(
    session: &Session,
    form_token: &str,
) -> Result<(), StatusCode> {
    check_and_rotate(session, form_token).await
}

/// Form-field check for handlers. Requests whose header token already
/// passed the middleware are accepted as is: the session token has been
/// rotated by then, so the form field can no longer match it.
pub async fn check_form_token(
    session: &Session,
    verified: Option<&CsrfVerified>,
    form_token: &str,
) -> Result<(), StatusCode> {
    if verified.is_some() {
        return Ok(());
    }
    validate_csrf_form_field(session, form_token).await
}

/// Compares `provided` with the session token, then replaces the session
/// token so the same value cannot be submitted twice.
async fn check_and_rotate(session: &Session, provided: &str) -> Result<(), StatusCode> {
    let stored = stored_token(session).await?;

    if provided != stored.value {
        warn!(
            "CSRF token mismatch: expected {}, got {}",
            prefix(&stored.value),
            prefix(provided)
        );
        return Err(StatusCode::FORBIDDEN);
    }

    if let Err(e) = generate_csrf_token(session).await {
        warn!("Could not rotate CSRF token: {}", e);
    }
    Ok(())
}
