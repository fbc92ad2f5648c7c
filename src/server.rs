//! HTTP surface: a liveness probe and the token-addressed webhook endpoint.
//!
//! Telegram expects a 200 for every delivered update; anything else triggers
//! redelivery. The webhook therefore answers `OK` even for payloads it cannot
//! parse — failures are tracing events, never HTTP statuses.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tracing::warn;

use crate::bot::{self, AppState};
use crate::update::Update;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/{token}", post(webhook))
        .with_state(state)
}

async fn index() -> &'static str {
    "Bot is running!"
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: String,
) -> Result<&'static str, StatusCode> {
    // The bot token doubles as the webhook path secret.
    if token != state.config.telegram.bot_token {
        return Err(StatusCode::NOT_FOUND);
    }

    match serde_json::from_str::<Update>(&body) {
        Ok(update) => bot::handle_update(&state, update).await,
        Err(e) => warn!("discarding malformed update payload: {e}"),
    }
    Ok("OK")
}
