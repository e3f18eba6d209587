//! Telegram Bot API transport for the tally bot.
//!
//! Provides the outbound `ChatTransport` client, the update parser that turns
//! raw updates into `InboundMessage`s, and the two ingress modes: an axum
//! webhook server and a `getUpdates` long-poll loop.

mod api_client;
mod polling;
mod update;
mod webhook;

pub use api_client::{TelegramApiClient, TelegramClientConfig, DEFAULT_TELEGRAM_API_BASE};
pub use polling::{poll_once, run_polling, PollingConfig};
pub use update::{parse_update, UpdateParseError};
pub use webhook::{build_webhook_router, serve_webhook, WEBHOOK_PATH, WEBHOOK_SECRET_HEADER};
