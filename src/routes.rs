use crate::auth::middleware::{redirect_if_authenticated, require_auth};
use crate::config::session::SessionLayer;
use crate::error::AppError;
use crate::handlers::{community_handlers, site_handlers, user_handlers};
use crate::middleware::{add_security_headers, csrf_validation_middleware, locale_middleware};
use crate::AppState;
use axum::{middleware, routing::get, Router};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::SessionStore;

/// Builds the full browser-facing application.
pub fn build_router<S>(state: AppState, session_layer: SessionLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    let anonymous_routes = Router::new()
        .route(
            "/user/signup/",
            get(user_handlers::signup_page).post(user_handlers::signup_handler),
        )
        .route("/user/verify/", get(user_handlers::verify_handler))
        .route(
            "/user/login/",
            get(user_handlers::login_page).post(user_handlers::login_handler),
        )
        .route(
            "/user/reset-password/",
            get(user_handlers::reset_password_page).post(user_handlers::reset_password_handler),
        )
        .layer(middleware::from_fn(redirect_if_authenticated));

    let protected_routes = Router::new()
        .route("/user/", get(user_handlers::detail_self_handler))
        .route("/user/{pk}/", get(user_handlers::detail_handler))
        .route(
            "/user/edit/",
            get(user_handlers::edit_page).post(user_handlers::edit_handler),
        )
        .route(
            "/user/change-password/",
            get(user_handlers::change_password_page).post(user_handlers::change_password_handler),
        )
        .route(
            "/user/api/",
            get(user_handlers::api_settings_page).post(user_handlers::regenerate_token_handler),
        )
        .route("/user/list/", get(user_handlers::list_handler))
        .route(
            "/community/slack/",
            get(community_handlers::open_slack_handler),
        )
        .layer(middleware::from_fn(require_auth));

    Router::new()
        .route("/", get(site_handlers::index_handler))
        .route("/user/logout/", get(user_handlers::logout_handler))
        .merge(anonymous_routes)
        .merge(protected_routes)
        .nest_service("/assets", ServeDir::new("static"))
        .fallback(|| async { AppError::NotFound })
        // Layers
        .layer(middleware::from_fn_with_state(
            state.clone(),
            locale_middleware,
        ))
        .layer(middleware::from_fn(csrf_validation_middleware))
        .layer(session_layer)
        .layer(middleware::from_fn(add_security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
