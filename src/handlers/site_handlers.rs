use crate::error::Result;
use crate::handlers::{render, Nav};
use crate::middleware::csrf::get_or_create_csrf_token;
use askama::Template;
use axum::{http::StatusCode, response::Response};
use tower_sessions::Session;

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    nav: Nav,
    csrf_token: String,
}

/// GET / - landing page, with a login form for anonymous visitors
pub async fn index_handler(session: Session) -> Result<Response> {
    let template = IndexTemplate {
        nav: Nav::from_session(&session).await?,
        csrf_token: get_or_create_csrf_token(&session).await?,
    };
    render(StatusCode::OK, &template)
}
