use std::path::PathBuf;

use chrono_tz::Tz;
use clap::Parser;

use crate::cli_types::{CliIngressMode, CliLedgerBackend};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_timezone(value: &str) -> Result<Tz, String> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|error| format!("unknown IANA timezone '{value}': {error}"))
}

#[derive(Debug, Parser)]
#[command(
    name = "tally-bot",
    about = "Counts two participants' messages in one Telegram forum topic",
    version
)]
pub struct Cli {
    #[arg(
        long = "telegram-bot-token",
        env = "TALLY_TELEGRAM_BOT_TOKEN",
        hide_env_values = true,
        help = "Bot API token issued by BotFather"
    )]
    pub telegram_bot_token: String,

    #[arg(
        long = "telegram-api-base",
        env = "TALLY_TELEGRAM_API_BASE",
        default_value = "https://api.telegram.org"
    )]
    pub telegram_api_base: String,

    #[arg(
        long = "telegram-request-timeout-ms",
        env = "TALLY_TELEGRAM_REQUEST_TIMEOUT_MS",
        default_value_t = 15_000,
        value_parser = parse_positive_u64
    )]
    pub telegram_request_timeout_ms: u64,

    #[arg(
        long = "bot-username",
        env = "TALLY_BOT_USERNAME",
        help = "Username used to match /command@botname; resolved via getMe when omitted"
    )]
    pub bot_username: Option<String>,

    #[arg(
        long,
        env = "TALLY_INGRESS",
        value_enum,
        default_value_t = CliIngressMode::Webhook
    )]
    pub ingress: CliIngressMode,

    #[arg(
        long = "webhook-bind",
        env = "TALLY_WEBHOOK_BIND",
        default_value = "0.0.0.0:8080"
    )]
    pub webhook_bind: String,

    #[arg(
        long = "webhook-public-url",
        env = "TALLY_WEBHOOK_PUBLIC_URL",
        help = "Public base URL; the webhook is registered at <url>/telegram"
    )]
    pub webhook_public_url: Option<String>,

    #[arg(
        long = "webhook-secret",
        env = "TALLY_WEBHOOK_SECRET",
        hide_env_values = true
    )]
    pub webhook_secret: Option<String>,

    #[arg(
        long = "poll-timeout-secs",
        env = "TALLY_POLL_TIMEOUT_SECS",
        default_value_t = 30
    )]
    pub poll_timeout_secs: u64,

    #[arg(long = "participant-a-id", env = "TALLY_PARTICIPANT_A_ID")]
    pub participant_a_id: i64,

    #[arg(
        long = "participant-a-label",
        env = "TALLY_PARTICIPANT_A_LABEL",
        default_value = "Friend"
    )]
    pub participant_a_label: String,

    #[arg(long = "participant-b-id", env = "TALLY_PARTICIPANT_B_ID")]
    pub participant_b_id: i64,

    #[arg(
        long = "participant-b-label",
        env = "TALLY_PARTICIPANT_B_LABEL",
        default_value = "Me"
    )]
    pub participant_b_label: String,

    #[arg(
        long = "ledger-backend",
        env = "TALLY_LEDGER_BACKEND",
        value_enum,
        default_value_t = CliLedgerBackend::Sqlite
    )]
    pub ledger_backend: CliLedgerBackend,

    #[arg(long = "postgrest-url", env = "TALLY_POSTGREST_URL")]
    pub postgrest_url: Option<String>,

    #[arg(
        long = "postgrest-key",
        env = "TALLY_POSTGREST_KEY",
        hide_env_values = true
    )]
    pub postgrest_key: Option<String>,

    #[arg(
        long = "postgrest-table",
        env = "TALLY_POSTGREST_TABLE",
        default_value = "actions"
    )]
    pub postgrest_table: String,

    #[arg(
        long = "sqlite-path",
        env = "TALLY_SQLITE_PATH",
        default_value = ".tally/ledger.sqlite"
    )]
    pub sqlite_path: PathBuf,

    #[arg(
        long,
        env = "TALLY_TIMEZONE",
        default_value = "UTC",
        value_parser = parse_timezone,
        help = "IANA timezone that decides which calendar day a message counts toward"
    )]
    pub timezone: Tz,

    #[arg(
        long = "render-retry-max-attempts",
        env = "TALLY_RENDER_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize
    )]
    pub render_retry_max_attempts: usize,

    #[arg(
        long = "render-retry-base-delay-ms",
        env = "TALLY_RENDER_RETRY_BASE_DELAY_MS",
        default_value_t = 4_000,
        value_parser = parse_positive_u64
    )]
    pub render_retry_base_delay_ms: u64,

    #[arg(
        long = "render-retry-max-delay-ms",
        env = "TALLY_RENDER_RETRY_MAX_DELAY_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64
    )]
    pub render_retry_max_delay_ms: u64,

    #[arg(
        long = "processed-message-cap",
        env = "TALLY_PROCESSED_MESSAGE_CAP",
        default_value_t = 4_096,
        value_parser = parse_positive_usize
    )]
    pub processed_message_cap: usize,
}
