use crate::api::ApiClientError;
use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

// Type alias for Result with our AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User service unavailable: {0}")]
    Upstream(#[from] ApiClientError),

    #[error("Unexpected response from the user service (status {0})")]
    UnexpectedStatus(u16),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Page not found")]
    NotFound,

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Upstream(_) | AppError::UnexpectedStatus(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Session(_) | AppError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    title: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (title, message) = match &self {
            AppError::NotFound => (
                "Not found".to_string(),
                "The page you were looking for does not exist.".to_string(),
            ),
            AppError::Upstream(e) => {
                tracing::error!("User service request failed: {}", e);
                (
                    "Service unavailable".to_string(),
                    "The user service could not be reached. Please try again later.".to_string(),
                )
            }
            AppError::UnexpectedStatus(code) => {
                tracing::error!("User service answered with unexpected status {}", code);
                ("Service error".to_string(), self.to_string())
            }
            AppError::Session(e) => {
                tracing::error!("Session store failure: {}", e);
                (
                    "Internal server error".to_string(),
                    "Something went wrong on our side.".to_string(),
                )
            }
            AppError::Template(e) => {
                tracing::error!("Template rendering failed: {}", e);
                (
                    "Internal server error".to_string(),
                    "Something went wrong on our side.".to_string(),
                )
            }
        };

        let template = ErrorTemplate { title, message };
        let html = template
            .render()
            .unwrap_or_else(|_| "<html><body><h1>Error</h1></body></html>".to_string());

        (status, Html(html)).into_response()
    }
}
