pub mod community_handlers;
pub mod site_handlers;
pub mod user_handlers;

use crate::auth::current_user;
use crate::error::Result;
use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tower_sessions::Session;

/// Navigation state shown on every page.
#[derive(Debug, Clone, Default)]
pub struct Nav {
    pub authenticated: bool,
    pub nickname: String,
}

impl Nav {
    pub async fn from_session(session: &Session) -> Result<Self> {
        let user = current_user(session).await?;
        Ok(match user.user() {
            Some(user) => Self {
                authenticated: true,
                nickname: user
                    .profile
                    .as_ref()
                    .map(|p| p.nickname.clone())
                    .unwrap_or_default(),
            },
            None => Self::default(),
        })
    }
}

pub(crate) fn render<T: Template>(status: StatusCode, template: &T) -> Result<Response> {
    let html = template.render()?;
    Ok((status, Html(html)).into_response())
}
