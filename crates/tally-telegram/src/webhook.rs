//! Webhook ingress: `POST /telegram` for updates and `GET /health`.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use tally_counter::CounterBot;

use crate::update::{parse_update, UpdateParseError};

pub const WEBHOOK_PATH: &str = "/telegram";
pub const WEBHOOK_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

struct WebhookState {
    bot: Arc<CounterBot>,
    secret: Option<String>,
}

pub fn build_webhook_router(bot: Arc<CounterBot>, secret: Option<String>) -> Router {
    let secret = secret
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    Router::new()
        .route(WEBHOOK_PATH, post(handle_telegram_update))
        .route("/health", get(handle_health))
        .with_state(Arc::new(WebhookState { bot, secret }))
}

/// Serves `router` on `listener` until `shutdown` resolves.
pub async fn serve_webhook<F>(listener: TcpListener, router: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener
        .local_addr()
        .context("failed to resolve webhook bound address")?;
    tracing::info!(addr = %local_addr, path = WEBHOOK_PATH, "webhook server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("webhook server exited unexpectedly")
}

async fn handle_health() -> &'static str {
    "OK"
}

async fn handle_telegram_update(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, &'static str) {
    if let Some(expected) = state.secret.as_deref() {
        let observed = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .unwrap_or("");
        if observed != expected {
            tracing::warn!("telegram webhook secret mismatch");
            return (StatusCode::FORBIDDEN, "Forbidden");
        }
    }

    let parsed = serde_json::from_str::<serde_json::Value>(&body)
        .map_err(UpdateParseError::from)
        .and_then(|raw| parse_update(&raw));
    match parsed {
        Ok(Some(message)) => {
            let outcome = state.bot.handle_message(message).await;
            tracing::debug!(?outcome, "webhook update dispatched");
            (StatusCode::OK, "OK")
        }
        Ok(None) => (StatusCode::OK, "OK"),
        Err(error) => {
            tracing::warn!(%error, "rejected malformed telegram update");
            (StatusCode::BAD_REQUEST, "Bad Request")
        }
    }
}
