use crate::auth::session::{current_user, CurrentUser};
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::warn;

pub const LOGIN_URL: &str = "/user/login/";
pub const LOGIN_REDIRECT_URL: &str = "/user/";

/// Lets logged-in users through with their `AuthUser` as a request extension;
/// everyone else is sent to the login page.
pub async fn require_auth(session: Session, mut request: Request, next: Next) -> Response {
    match current_user(&session).await {
        Ok(CurrentUser::Authenticated(user)) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Ok(CurrentUser::Anonymous) => Redirect::to(LOGIN_URL).into_response(),
        Err(e) => {
            warn!("Could not read session in auth gate: {}", e);
            Redirect::to(LOGIN_URL).into_response()
        }
    }
}

/// Pages such as signup and login only make sense for anonymous visitors.
pub async fn redirect_if_authenticated(session: Session, request: Request, next: Next) -> Response {
    match current_user(&session).await {
        Ok(user) if user.is_authenticated() => Redirect::to(LOGIN_REDIRECT_URL).into_response(),
        _ => next.run(request).await,
    }
}
