//! Transport-neutral inbound message event.

use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, MessageId, MessageRef, ThreadId, ThreadRef, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `MessageKind` values.
pub enum MessageKind {
    Text,
    Command,
    Media,
    Service,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Command => "command",
            Self::Media => "media",
            Self::Service => "service",
        }
    }

    /// Countable participant content: plain text only. Media, bot commands
    /// and service notices are not counted.
    pub fn is_content(self) -> bool {
        matches!(self, Self::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub update_id: i64,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
    #[serde(default)]
    pub is_topic_message: bool,
    #[serde(default)]
    pub author_id: Option<UserId>,
    pub kind: MessageKind,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp_unix: i64,
}

impl InboundMessage {
    pub fn thread_ref(&self) -> Option<ThreadRef> {
        self.thread_id.map(|thread_id| ThreadRef {
            chat_id: self.chat_id,
            thread_id,
        })
    }

    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }

    /// Key used to collapse redelivered copies of the same message.
    pub fn dedupe_key(&self) -> String {
        format!("{}:{}", self.chat_id, self.message_id)
    }
}
