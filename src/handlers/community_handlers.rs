use crate::AppState;
use axum::{extract::State, response::Redirect};

/// GET /community/slack/ - sends members on to the Slack team
pub async fn open_slack_handler(State(state): State<AppState>) -> Redirect {
    Redirect::to(&state.config.slack_url)
}
