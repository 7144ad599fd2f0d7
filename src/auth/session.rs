//! Session-backed authentication
//!
//! The remote API owns users and their auth tokens. After a successful
//! authentication the front end keeps the user's pk and token in the server-side
//! session together with a snapshot of their display fields (nickname, timezone,
//! language). The snapshot is only as fresh as the last `refresh`.

use crate::api::{UserApi, UserRecord};
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{debug, info, warn};

pub const USER_PK_KEY: &str = "user_pk";
pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const PROFILE_KEY: &str = "profile";

/// Display fields cached from the user's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedProfile {
    pub nickname: String,
    pub timezone: String,
    pub language: String,
}

impl From<&UserRecord> for CachedProfile {
    fn from(record: &UserRecord) -> Self {
        Self {
            nickname: record.nickname.clone(),
            timezone: record.timezone.clone(),
            language: record.language.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub pk: i64,
    pub token: String,
    /// `None` until the first successful refresh.
    pub profile: Option<CachedProfile>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CurrentUser {
    Anonymous,
    Authenticated(AuthUser),
}

impl CurrentUser {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, CurrentUser::Authenticated(_))
    }

    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            CurrentUser::Authenticated(user) => Some(user),
            CurrentUser::Anonymous => None,
        }
    }
}

/// Starts an authenticated session for `pk`.
///
/// Whatever the session held before is dropped and the session id is cycled.
pub async fn login(
    session: &Session,
    pk: i64,
    token: &str,
) -> Result<(), tower_sessions::session::Error> {
    session.clear().await;
    session.cycle_id().await?;
    session.insert(USER_PK_KEY, pk).await?;
    session.insert(AUTH_TOKEN_KEY, token).await?;

    info!("User {} logged in", pk);
    Ok(())
}

/// Destroys the session entirely.
pub async fn logout(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

pub async fn current_user(session: &Session) -> Result<CurrentUser, tower_sessions::session::Error> {
    let pk = match session.get::<i64>(USER_PK_KEY).await? {
        Some(pk) => pk,
        None => return Ok(CurrentUser::Anonymous),
    };

    let token = match session.get::<String>(AUTH_TOKEN_KEY).await? {
        Some(token) => token,
        None => {
            warn!("Session for user {} has no auth token", pk);
            return Ok(CurrentUser::Anonymous);
        }
    };

    let profile = session.get::<CachedProfile>(PROFILE_KEY).await?;

    Ok(CurrentUser::Authenticated(AuthUser { pk, token, profile }))
}

/// Swaps the stored auth token, keeping the rest of the session.
pub async fn replace_token(
    session: &Session,
    token: &str,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(AUTH_TOKEN_KEY, token).await
}

/// Re-fetches the user's record and overwrites the cached display fields.
///
/// Returns `true` when the cache was updated. Anonymous sessions are left
/// alone, and any failure keeps the previous snapshot in place.
pub async fn refresh(session: &Session, api: &dyn UserApi) -> bool {
    let user = match current_user(session).await {
        Ok(CurrentUser::Authenticated(user)) => user,
        Ok(CurrentUser::Anonymous) => return false,
        Err(e) => {
            warn!("Could not read session during refresh: {}", e);
            return false;
        }
    };

    let response = match api.get_user(user.pk, &user.token).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Profile refresh for user {} failed: {}", user.pk, e);
            return false;
        }
    };

    if response.status != 200 {
        warn!(
            "Profile refresh for user {} returned status {}",
            user.pk, response.status
        );
        return false;
    }

    let record: UserRecord = match response.data() {
        Ok(record) => record,
        Err(e) => {
            warn!("Profile refresh for user {} returned bad data: {}", user.pk, e);
            return false;
        }
    };

    if let Err(e) = session
        .insert(PROFILE_KEY, CachedProfile::from(&record))
        .await
    {
        warn!("Could not store refreshed profile: {}", e);
        return false;
    }

    debug!("Refreshed cached profile for user {}", user.pk);
    true
}

/// Fetches the full record of the logged-in user.
///
/// `Ok(None)` when nobody is logged in or the API no longer knows the user.
pub async fn fetch_record(
    session: &Session,
    api: &dyn UserApi,
) -> Result<Option<UserRecord>, AppError> {
    let user = match current_user(session).await? {
        CurrentUser::Authenticated(user) => user,
        CurrentUser::Anonymous => return Ok(None),
    };

    let response = api.get_user(user.pk, &user.token).await?;
    match response.status {
        200 => Ok(Some(response.data()?)),
        404 => Ok(None),
        status => Err(AppError::UnexpectedStatus(status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::user_api::MockUserApi;
    use crate::api::{ApiClientError, ApiResponse};
    use mockall::predicate::*;
    use std::sync::Arc;
    use tower_sessions::MemoryStore;

    const RECORD: &str = r#"{"version":[0,0,1],"data":{"pk":7,"email":"sim@ossm.test","authToken":"ABCDEFabcdef12345678","verificationCode":null,"isActive":true,"accessLevel":1,"nickname":"sim","timezone":"Australia/Sydney","language":"en-AU","dateCreated":"2016-01-01 00:00:00+0000","lastLogin":null}}"#;

    fn new_session() -> Session {
        let store = Arc::new(MemoryStore::default());
        Session::new(None, store, None)
    }

    #[tokio::test]
    async fn test_login_replaces_previous_state() {
        let session = new_session();
        session.insert("stale", "value").await.unwrap();

        login(&session, 7, "ABCDEFabcdef12345678").await.unwrap();

        assert_eq!(session.get::<String>("stale").await.unwrap(), None);
        let current = current_user(&session).await.unwrap();
        assert_eq!(
            current,
            CurrentUser::Authenticated(AuthUser {
                pk: 7,
                token: "ABCDEFabcdef12345678".to_string(),
                profile: None,
            })
        );
    }

    #[tokio::test]
    async fn test_login_cycles_session_id() {
        let session = new_session();
        session.insert("visited", true).await.unwrap();
        session.save().await.unwrap();
        let anonymous_id = session.id().expect("saved session has an id");

        login(&session, 7, "ABCDEFabcdef12345678").await.unwrap();
        session.save().await.unwrap();

        let logged_in_id = session.id().expect("saved session has an id");
        assert_ne!(anonymous_id, logged_in_id);
    }

    #[tokio::test]
    async fn test_anonymous_session() {
        let session = new_session();
        let current = current_user(&session).await.unwrap();
        assert!(!current.is_authenticated());
        assert!(current.user().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let session = new_session();
        login(&session, 7, "ABCDEFabcdef12345678").await.unwrap();

        logout(&session).await.unwrap();

        assert!(!current_user(&session).await.unwrap().is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_caches_profile() {
        let session = new_session();
        login(&session, 7, "ABCDEFabcdef12345678").await.unwrap();

        let mut api = MockUserApi::new();
        api.expect_get_user()
            .with(eq(7), eq("ABCDEFabcdef12345678"))
            .times(1)
            .returning(|_, _| Box::pin(async move { Ok(ApiResponse::new(200, RECORD)) }));

        assert!(refresh(&session, &api).await);

        let user = current_user(&session).await.unwrap();
        let profile = user.user().unwrap().profile.clone().unwrap();
        assert_eq!(profile.nickname, "sim");
        assert_eq!(profile.timezone, "Australia/Sydney");
        assert_eq!(profile.language, "en-AU");
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_profile() {
        let session = new_session();
        login(&session, 7, "ABCDEFabcdef12345678").await.unwrap();
        let previous = CachedProfile {
            nickname: "old".to_string(),
            timezone: "UTC".to_string(),
            language: "en-AU".to_string(),
        };
        session.insert(PROFILE_KEY, &previous).await.unwrap();

        let mut api = MockUserApi::new();
        api.expect_get_user()
            .times(1)
            .returning(|_, _| Box::pin(async move { Ok(ApiResponse::new(500, "")) }));

        assert!(!refresh(&session, &api).await);

        let cached = session.get::<CachedProfile>(PROFILE_KEY).await.unwrap();
        assert_eq!(cached, Some(previous));
    }

    #[tokio::test]
    async fn test_refresh_transport_error_is_swallowed() {
        let session = new_session();
        login(&session, 7, "ABCDEFabcdef12345678").await.unwrap();

        let mut api = MockUserApi::new();
        api.expect_get_user().times(1).returning(|_, _| {
            Box::pin(async move {
                Err(ApiClientError::InvalidHeader("simulated".to_string()))
            })
        });

        assert!(!refresh(&session, &api).await);
        assert!(current_user(&session).await.unwrap().is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_is_noop_when_anonymous() {
        let session = new_session();
        let api = MockUserApi::new();

        // No expectation set: any call would panic.
        assert!(!refresh(&session, &api).await);
    }

    #[tokio::test]
    async fn test_replace_token_keeps_identity() {
        let session = new_session();
        login(&session, 7, "ABCDEFabcdef12345678").await.unwrap();

        replace_token(&session, "ZYXWVUzyxwvu87654321").await.unwrap();

        let user = current_user(&session).await.unwrap();
        let user = user.user().unwrap();
        assert_eq!(user.pk, 7);
        assert_eq!(user.token, "ZYXWVUzyxwvu87654321");
    }

    #[tokio::test]
    async fn test_fetch_record_not_found() {
        let session = new_session();
        login(&session, 7, "ABCDEFabcdef12345678").await.unwrap();

        let mut api = MockUserApi::new();
        api.expect_get_user()
            .times(1)
            .returning(|_, _| Box::pin(async move { Ok(ApiResponse::new(404, "")) }));

        let record = fetch_record(&session, &api).await.unwrap();
        assert!(record.is_none());
    }
}
