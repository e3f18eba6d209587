//! Telegram update payloads mapped onto transport-neutral inbound messages.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use tally_core::{ChatId, InboundMessage, MessageId, MessageKind, ThreadId, UserId};

const MEDIA_FIELDS: &[&str] = &[
    "animation",
    "audio",
    "contact",
    "dice",
    "document",
    "location",
    "photo",
    "poll",
    "sticker",
    "venue",
    "video",
    "video_note",
    "voice",
];

#[derive(Debug, Error)]
pub enum UpdateParseError {
    #[error("telegram update is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    message_thread_id: Option<i64>,
    #[serde(default)]
    is_topic_message: bool,
    from: Option<TelegramUser>,
    chat: TelegramChat,
    #[serde(default)]
    date: i64,
    text: Option<String>,
    #[serde(default)]
    entities: Vec<TelegramEntity>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramEntity {
    #[serde(rename = "type")]
    kind: String,
    offset: i64,
}

/// Parses one raw update. Updates without a new `message` (edits, callback
/// queries, member changes) yield `Ok(None)`.
pub fn parse_update(raw: &Value) -> Result<Option<InboundMessage>, UpdateParseError> {
    let update = TelegramUpdate::deserialize(raw)?;
    let Some(message) = update.message else {
        return Ok(None);
    };
    let kind = classify_kind(&message);
    Ok(Some(InboundMessage {
        update_id: update.update_id,
        chat_id: ChatId(message.chat.id),
        message_id: MessageId(message.message_id),
        thread_id: message.message_thread_id.map(ThreadId),
        is_topic_message: message.is_topic_message,
        author_id: message.from.map(|user| UserId(user.id)),
        kind,
        text: message.text.unwrap_or_default(),
        timestamp_unix: message.date,
    }))
}

fn classify_kind(message: &TelegramMessage) -> MessageKind {
    if message.text.is_some() {
        let leading_command = message
            .entities
            .iter()
            .any(|entity| entity.kind == "bot_command" && entity.offset == 0);
        if leading_command {
            return MessageKind::Command;
        }
        return MessageKind::Text;
    }
    if MEDIA_FIELDS
        .iter()
        .any(|field| message.rest.contains_key(*field))
    {
        return MessageKind::Media;
    }
    MessageKind::Service
}
