//! Per-request language and timezone
//!
//! A logged-in user's cached profile decides both. Anonymous visitors get the
//! first supported language from `Accept-Language` (or the configured default)
//! and UTC.

use crate::auth::{current_user, CachedProfile};
use crate::forms::LANGUAGES;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tower_sessions::Session;
use tracing::warn;

/// Date format the user API serializes timestamps with.
pub const API_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";

#[derive(Debug, Clone, PartialEq)]
pub struct Locale {
    pub language: String,
    pub timezone: Tz,
}

impl Locale {
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }

    /// Renders a timestamp from the API in this locale's timezone.
    ///
    /// The API writes `2016-01-01 00:00:00+0000`; RFC 3339 is accepted too.
    /// Unparseable input is returned as-is.
    pub fn format_timestamp(&self, value: &str) -> String {
        let parsed = DateTime::parse_from_str(value, API_TIMESTAMP_FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(value));
        match parsed {
            Ok(parsed) => parsed
                .with_timezone(&self.timezone)
                .format("%d %b %Y %H:%M %Z")
                .to_string(),
            Err(_) => value.to_string(),
        }
    }
}

/// Returns the supported language code matching one tag of an
/// `Accept-Language` header, honouring the header's order.
pub fn negotiate_language(accept_language: &str) -> Option<&'static str> {
    accept_language
        .split(',')
        .filter_map(|part| part.split(';').next())
        .map(str::trim)
        .filter(|tag| !tag.is_empty() && *tag != "*")
        .find_map(|tag| {
            LANGUAGES
                .iter()
                .map(|(code, _)| *code)
                .find(|code| code.eq_ignore_ascii_case(tag))
                .or_else(|| {
                    LANGUAGES.iter().map(|(code, _)| *code).find(|code| {
                        code.split('-')
                            .next()
                            .map(|primary| primary.eq_ignore_ascii_case(tag))
                            .unwrap_or(false)
                    })
                })
        })
}

pub fn resolve_locale(
    profile: Option<&CachedProfile>,
    accept_language: Option<&str>,
    default_language: &str,
) -> Locale {
    let language = profile
        .map(|p| p.language.clone())
        .or_else(|| accept_language.and_then(negotiate_language).map(String::from))
        .unwrap_or_else(|| default_language.to_string());

    let timezone = profile
        .and_then(|p| match p.timezone.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                warn!("Cached timezone '{}' is not recognised", p.timezone);
                None
            }
        })
        .unwrap_or(Tz::UTC);

    Locale { language, timezone }
}

pub async fn locale_middleware(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let profile = match current_user(&session).await {
        Ok(user) => user.user().and_then(|u| u.profile.clone()),
        Err(e) => {
            warn!("Could not read session for locale: {}", e);
            None
        }
    };

    let accept_language = request
        .headers()
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok());

    let locale = resolve_locale(
        profile.as_ref(),
        accept_language,
        &state.config.default_language,
    );
    let language = locale.language.clone();
    request.extensions_mut().insert(locale);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&language) {
        response.headers_mut().insert(header::CONTENT_LANGUAGE, value);
    }
    response
}
