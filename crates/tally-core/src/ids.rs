use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Telegram user id of a message author.
    UserId
);
numeric_id!(
    /// Telegram chat id (negative for supergroups).
    ChatId
);
numeric_id!(
    /// Forum topic id (`message_thread_id`).
    ThreadId
);
numeric_id!(
    /// Message id, unique within one chat.
    MessageId
);

/// One forum topic inside one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadRef {
    pub chat_id: ChatId,
    pub thread_id: ThreadId,
}

/// A stable reference to one sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}
