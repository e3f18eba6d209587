//! Process startup: build the ledger and bot, hydrate, then serve.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;

use tally_core::{ParticipantBinding, RetryPolicy, TrackedParticipants, UserId};
use tally_counter::{CounterBot, CounterBotConfig, CounterStore};
use tally_ledger::{InMemoryLedger, Ledger, PostgrestLedger, PostgrestLedgerConfig, SqliteLedger};
use tally_telegram::{
    build_webhook_router, run_polling, serve_webhook, PollingConfig, TelegramApiClient,
    TelegramClientConfig, WEBHOOK_PATH,
};

use crate::bootstrap_helpers::shutdown_signal;
use crate::cli_args::Cli;
use crate::cli_types::{CliIngressMode, CliLedgerBackend};

pub(crate) fn build_participants(cli: &Cli) -> Result<TrackedParticipants> {
    if cli.participant_a_id == cli.participant_b_id {
        bail!("participant ids must differ (both are {})", cli.participant_a_id);
    }
    Ok(TrackedParticipants::new(
        ParticipantBinding {
            user_id: UserId(cli.participant_a_id),
            label: cli.participant_a_label.trim().to_string(),
        },
        ParticipantBinding {
            user_id: UserId(cli.participant_b_id),
            label: cli.participant_b_label.trim().to_string(),
        },
    ))
}

pub(crate) fn build_ledger(cli: &Cli) -> Result<Arc<dyn Ledger>> {
    let ledger: Arc<dyn Ledger> = match cli.ledger_backend {
        CliLedgerBackend::Memory => {
            tracing::warn!("in-memory ledger selected; counts are lost on restart");
            Arc::new(InMemoryLedger::new())
        }
        CliLedgerBackend::Sqlite => Arc::new(
            SqliteLedger::new(&cli.sqlite_path).with_context(|| {
                format!("failed to open sqlite ledger {}", cli.sqlite_path.display())
            })?,
        ),
        CliLedgerBackend::Postgrest => {
            let base_url = non_empty(cli.postgrest_url.as_deref())
                .context("--postgrest-url is required for the postgrest ledger backend")?;
            let api_key = non_empty(cli.postgrest_key.as_deref())
                .context("--postgrest-key is required for the postgrest ledger backend")?;
            Arc::new(
                PostgrestLedger::new(PostgrestLedgerConfig {
                    base_url: base_url.to_string(),
                    api_key: api_key.to_string(),
                    table: cli.postgrest_table.clone(),
                    request_timeout_ms: cli.telegram_request_timeout_ms,
                })
                .context("failed to create postgrest ledger client")?,
            )
        }
    };
    Ok(ledger)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub(crate) fn webhook_url(public_url: &str) -> String {
    let base = public_url.trim().trim_end_matches('/');
    if base.ends_with(WEBHOOK_PATH) {
        base.to_string()
    } else {
        format!("{base}{WEBHOOK_PATH}")
    }
}

pub(crate) fn counter_bot_config(cli: &Cli, bot_username: Option<String>) -> CounterBotConfig {
    CounterBotConfig {
        timezone: cli.timezone,
        bot_username,
        processed_message_cap: cli.processed_message_cap,
        render_policy: RetryPolicy::new(
            cli.render_retry_max_attempts,
            Duration::from_millis(cli.render_retry_base_delay_ms),
            Duration::from_millis(cli.render_retry_max_delay_ms),
        ),
    }
}

pub(crate) async fn run_bot(cli: Cli) -> Result<()> {
    let participants = build_participants(&cli)?;
    let ledger = build_ledger(&cli)?;
    let client = Arc::new(TelegramApiClient::new(TelegramClientConfig {
        api_base: cli.telegram_api_base.clone(),
        bot_token: cli.telegram_bot_token.clone(),
        request_timeout_ms: cli.telegram_request_timeout_ms,
    })?);

    let store = Arc::new(CounterStore::new(ledger.clone(), participants));
    // Fatal: never serve counts that were not reconciled with the ledger.
    store
        .hydrate()
        .await
        .with_context(|| format!("failed to hydrate counters from {} ledger", ledger.backend_name()))?;

    let bot_username = match non_empty(cli.bot_username.as_deref()) {
        Some(username) => Some(username.trim_start_matches('@').to_string()),
        None => match client.get_me_username().await {
            Ok(username) => username,
            Err(error) => {
                tracing::warn!(%error, "could not resolve bot username; /cmd@bot suffixes will be accepted for any bot");
                None
            }
        },
    };
    let bot = Arc::new(CounterBot::new(
        counter_bot_config(&cli, bot_username),
        store,
        client.clone(),
    ));

    match cli.ingress {
        CliIngressMode::Webhook => {
            let public_url = non_empty(cli.webhook_public_url.as_deref())
                .context("--webhook-public-url is required for webhook ingress")?;
            let url = webhook_url(public_url);
            client
                .set_webhook(&url, non_empty(cli.webhook_secret.as_deref()))
                .await
                .map_err(|error| anyhow::anyhow!("failed to register webhook: {error}"))?;
            tracing::info!("webhook registered");
            let listener = TcpListener::bind(cli.webhook_bind.as_str())
                .await
                .with_context(|| format!("failed to bind {}", cli.webhook_bind))?;
            let router = build_webhook_router(bot, cli.webhook_secret.clone());
            serve_webhook(listener, router, shutdown_signal()).await
        }
        CliIngressMode::Polling => {
            let config = PollingConfig {
                long_poll_timeout_secs: cli.poll_timeout_secs,
                ..PollingConfig::default()
            };
            run_polling(client, bot, config, shutdown_signal()).await
        }
    }
}
