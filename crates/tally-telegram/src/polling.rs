//! `getUpdates` long-poll ingress.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tally_counter::{ChatTransportError, CounterBot};

use crate::api_client::TelegramApiClient;
use crate::update::parse_update;

#[derive(Debug, Clone, Copy)]
pub struct PollingConfig {
    pub long_poll_timeout_secs: u64,
    pub error_backoff: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            long_poll_timeout_secs: 30,
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Fetches one batch, dispatches every message in it and advances `offset`
/// past the highest update id seen. Returns the number of updates fetched.
pub async fn poll_once(
    client: &TelegramApiClient,
    bot: &CounterBot,
    offset: &mut i64,
    long_poll_timeout_secs: u64,
) -> Result<usize, ChatTransportError> {
    let updates = client.get_updates(*offset, long_poll_timeout_secs).await?;
    for raw in &updates {
        if let Some(update_id) = raw.get("update_id").and_then(|value| value.as_i64()) {
            *offset = (*offset).max(update_id.saturating_add(1));
        }
        match parse_update(raw) {
            Ok(Some(message)) => {
                let outcome = bot.handle_message(message).await;
                tracing::debug!(?outcome, "polled update dispatched");
            }
            Ok(None) => {}
            Err(error) => tracing::warn!(%error, "skipping malformed telegram update"),
        }
    }
    Ok(updates.len())
}

/// Clears any webhook, then long-polls until `shutdown` resolves.
pub async fn run_polling<F>(
    client: Arc<TelegramApiClient>,
    bot: Arc<CounterBot>,
    config: PollingConfig,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    client
        .delete_webhook()
        .await
        .map_err(|error| anyhow::anyhow!("failed to delete webhook before polling: {error}"))?;
    tracing::info!(
        long_poll_timeout_secs = config.long_poll_timeout_secs,
        "polling for telegram updates"
    );

    tokio::pin!(shutdown);
    let mut offset = 0_i64;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("polling stopped");
                return Ok(());
            }
            result = poll_once(&client, &bot, &mut offset, config.long_poll_timeout_secs) => {
                if let Err(error) = result {
                    let delay = error
                        .retry_after_ms
                        .map(Duration::from_millis)
                        .unwrap_or_default()
                        .max(config.error_backoff);
                    tracing::warn!(
                        reason_code = %error.reason_code,
                        detail = %error.detail,
                        delay_ms = delay.as_millis() as u64,
                        "getUpdates failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
