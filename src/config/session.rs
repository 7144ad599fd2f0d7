//! Session cookie settings
//!
//! The session cookie holds the user's pk, API token and cached profile, so
//! it is always signed. Production hardens it further: `__Host-` prefix,
//! Secure, SameSite=Strict and a two hour idle expiry.

use std::env;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha512};
use time::Duration;
use tower_sessions::{
    cookie::{Key, SameSite},
    service::SignedCookie,
    Expiry, SessionManagerLayer, SessionStore,
};
use tracing::{debug, warn};

pub type SessionLayer<S> = SessionManagerLayer<S, SignedCookie>;

const MIN_SECRET_BYTES: usize = 64;
const WEAK_SECRET_MARKERS: &[&str] = &["example", "changeme", "default"];

/// Deployment environment, read from `ENVIRONMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn current() -> Self {
        match env::var("ENVIRONMENT").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        }
    }
}

pub fn is_production() -> bool {
    Environment::current() == Environment::Production
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: &'static str,
    pub secure: bool,
    pub same_site: SameSite,
    pub idle_expiry: Duration,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::for_environment(Environment::current())
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => SessionConfig {
                cookie_name: "__Host-session",
                secure: true,
                same_site: SameSite::Strict,
                idle_expiry: Duration::hours(2),
            },
            Environment::Development => SessionConfig {
                cookie_name: "session",
                secure: false,
                same_site: SameSite::Lax,
                idle_expiry: Duration::days(7),
            },
        }
    }

    /// Wraps `store` in a signed-cookie session layer.
    pub fn create_layer<S: SessionStore + Clone>(&self, store: S) -> SessionLayer<S> {
        debug!(
            "Session cookie '{}' (secure: {}, idle expiry: {})",
            self.cookie_name, self.secure, self.idle_expiry
        );

        SessionManagerLayer::new(store)
            .with_name(self.cookie_name)
            .with_secure(self.secure)
            .with_http_only(true)
            .with_same_site(self.same_site)
            .with_expiry(Expiry::OnInactivity(self.idle_expiry))
            .with_signed(signing_key(env::var("SESSION_SECRET").ok().as_deref()))
    }
}

/// Refuses to start a production server over plain HTTP or with a weak
/// `SESSION_SECRET`. Does nothing outside production.
pub fn validate_production_config() -> Result<()> {
    if !is_production() {
        return Ok(());
    }

    let force_https = env::var("FORCE_HTTPS").unwrap_or_default();
    if !matches!(force_https.to_ascii_lowercase().as_str(), "1" | "true") {
        bail!("Production requires HTTPS; set FORCE_HTTPS=true");
    }

    let secret = env::var("SESSION_SECRET").context("SESSION_SECRET must be set in production")?;
    if secret_bytes(&secret).len() < MIN_SECRET_BYTES {
        bail!(
            "SESSION_SECRET must be at least {} bytes in production",
            MIN_SECRET_BYTES
        );
    }

    let lowered = secret.to_ascii_lowercase();
    if WEAK_SECRET_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        bail!("SESSION_SECRET looks like a placeholder; generate a random one");
    }

    Ok(())
}

/// Base64 secrets are decoded; anything else is used as raw bytes.
fn secret_bytes(secret: &str) -> Vec<u8> {
    STANDARD
        .decode(secret.as_bytes())
        .unwrap_or_else(|_| secret.as_bytes().to_vec())
}

fn signing_key(secret: Option<&str>) -> Key {
    let bytes = match secret {
        Some(secret) if !secret.is_empty() => secret_bytes(secret),
        _ => {
            warn!("SESSION_SECRET not set; sessions will not survive a restart");
            return Key::generate();
        }
    };

    // Key::from needs 64 bytes
    if bytes.len() >= MIN_SECRET_BYTES {
        Key::from(&bytes[..MIN_SECRET_BYTES])
    } else {
        Key::from(Sha512::digest(&bytes).as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_secret_is_stretched() {
        let key = signing_key(Some("short"));
        assert_eq!(key.master().len(), 64);
    }

    #[test]
    fn test_same_secret_gives_same_key() {
        assert_eq!(
            signing_key(Some("abc")).master(),
            signing_key(Some("abc")).master()
        );
    }

    #[test]
    fn test_plain_secret_falls_back_to_raw_bytes() {
        assert_eq!(secret_bytes("not base64 !"), b"not base64 !".to_vec());
    }

    #[test]
    fn test_production_cookie_settings() {
        let config = SessionConfig::for_environment(Environment::Production);
        assert_eq!(config.cookie_name, "__Host-session");
        assert!(config.secure);
        assert_eq!(config.same_site, SameSite::Strict);
        assert_eq!(config.idle_expiry, Duration::hours(2));
    }
}
