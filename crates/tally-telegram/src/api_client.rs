//! Bot API client used for replies, the counter control and ingress setup.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use tally_core::{ChatId, InlineKeyboard, MessageId, MessageRef, ThreadId};
use tally_counter::transport::{
    REASON_INVALID_RESPONSE, REASON_NOT_MODIFIED, REASON_TRANSPORT_FAILED,
};
use tally_counter::{ChatTransport, ChatTransportError};

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const NOT_MODIFIED_MARKER: &str = "message is not modified";

#[derive(Debug, Clone)]
pub struct TelegramClientConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
}

impl Default for TelegramClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            bot_token: String::new(),
            request_timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BotApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    username: Option<String>,
}

#[derive(Clone)]
pub struct TelegramApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    request_timeout: Duration,
}

impl TelegramApiClient {
    pub fn new(config: TelegramClientConfig) -> anyhow::Result<Self> {
        let bot_token = config.bot_token.trim().to_string();
        if bot_token.is_empty() {
            anyhow::bail!("telegram bot token cannot be empty");
        }
        let api_base = config.api_base.trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            anyhow::bail!("telegram api base cannot be empty");
        }
        let request_timeout = Duration::from_millis(config.request_timeout_ms.max(1));
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| anyhow::anyhow!("failed to create telegram api client: {error}"))?;
        Ok(Self {
            http,
            api_base,
            bot_token,
            request_timeout,
        })
    }

    /// Calls `method` and decodes `result`. The token-bearing URL is never logged.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<T, ChatTransportError> {
        let url = format!("{}/bot{}/{method}", self.api_base, self.bot_token);
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|error| {
                ChatTransportError::new(
                    REASON_TRANSPORT_FAILED,
                    format!("telegram {method} request failed: {}", error.without_url()),
                    true,
                )
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            ChatTransportError::new(
                REASON_TRANSPORT_FAILED,
                format!("telegram {method} body read failed: {}", error.without_url()),
                true,
            )
            .with_status(status.as_u16())
        })?;
        let parsed = serde_json::from_str::<BotApiResponse<T>>(&body).ok();

        if status.is_success() {
            return match parsed {
                Some(BotApiResponse {
                    ok: true,
                    result: Some(result),
                    ..
                }) => Ok(result),
                Some(parsed) => Err(ChatTransportError::new(
                    REASON_INVALID_RESPONSE,
                    parsed
                        .description
                        .unwrap_or_else(|| format!("telegram {method} returned no result")),
                    false,
                )
                .with_status(status.as_u16())),
                None => Err(ChatTransportError::new(
                    REASON_INVALID_RESPONSE,
                    format!("telegram {method} returned an undecodable body"),
                    false,
                )
                .with_status(status.as_u16())),
            };
        }

        let (description, retry_after) = match parsed {
            Some(parsed) => (
                parsed.description.unwrap_or_default(),
                parsed.parameters.and_then(|parameters| parameters.retry_after),
            ),
            None => (truncate_detail(&body), None),
        };
        if description.contains(NOT_MODIFIED_MARKER) {
            return Err(
                ChatTransportError::new(REASON_NOT_MODIFIED, description, false)
                    .with_status(status.as_u16()),
            );
        }
        let mut error = ChatTransportError::from_status(
            status.as_u16(),
            format!("telegram {method}: {description}"),
        );
        if let Some(seconds) = retry_after {
            error = error.with_retry_after_ms(seconds.saturating_mul(1_000));
        }
        Err(error)
    }

    /// Username of the bot, used to match `/command@botname`.
    pub async fn get_me_username(&self) -> Result<Option<String>, ChatTransportError> {
        let user: BotUser = self.call("getMe", &json!({}), self.request_timeout).await?;
        Ok(user.username)
    }

    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), ChatTransportError> {
        let mut payload = json!({
            "url": url,
            "allowed_updates": ["message"],
        });
        if let Some(secret) = secret {
            payload["secret_token"] = Value::String(secret.to_string());
        }
        let _: bool = self.call("setWebhook", &payload, self.request_timeout).await?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<(), ChatTransportError> {
        let _: bool = self
            .call("deleteWebhook", &json!({}), self.request_timeout)
            .await?;
        Ok(())
    }

    /// Long-polls for updates starting at `offset`; returns raw update objects.
    pub async fn get_updates(
        &self,
        offset: i64,
        long_poll_timeout_secs: u64,
    ) -> Result<Vec<Value>, ChatTransportError> {
        let payload = json!({
            "offset": offset,
            "timeout": long_poll_timeout_secs,
            "allowed_updates": ["message"],
        });
        let timeout = self.request_timeout + Duration::from_secs(long_poll_timeout_secs);
        self.call("getUpdates", &payload, timeout).await
    }
}

fn truncate_detail(raw: &str) -> String {
    const LIMIT: usize = 256;
    let trimmed = raw.trim();
    if trimmed.chars().count() <= LIMIT {
        return trimmed.to_string();
    }
    let mut output = trimmed.chars().take(LIMIT).collect::<String>();
    output.push_str("...");
    output
}

#[async_trait]
impl ChatTransport for TelegramApiClient {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&InlineKeyboard>,
        thread_id: Option<ThreadId>,
    ) -> Result<MessageId, ChatTransportError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(thread_id) = thread_id {
            payload["message_thread_id"] = json!(thread_id);
        }
        if let Some(markup) = markup {
            payload["reply_markup"] = json!(markup);
        }
        let sent: SentMessage = self
            .call("sendMessage", &payload, self.request_timeout)
            .await?;
        Ok(MessageId(sent.message_id))
    }

    async fn edit_message(
        &self,
        target: MessageRef,
        text: &str,
        markup: Option<&InlineKeyboard>,
    ) -> Result<(), ChatTransportError> {
        let mut payload = json!({
            "chat_id": target.chat_id,
            "message_id": target.message_id,
            "text": text,
        });
        if let Some(markup) = markup {
            payload["reply_markup"] = json!(markup);
        }
        // Edits of bot messages return the edited message object.
        let _: Value = self
            .call("editMessageText", &payload, self.request_timeout)
            .await?;
        Ok(())
    }
}
