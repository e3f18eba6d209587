//! Outbound chat transport seam used by display sync and command replies.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use tally_core::{ChatId, InlineKeyboard, MessageId, MessageRef, RetryableError, ThreadId};

pub const REASON_NOT_MODIFIED: &str = "delivery_not_modified";
pub const REASON_RATE_LIMITED: &str = "delivery_rate_limited";
pub const REASON_PROVIDER_UNAVAILABLE: &str = "delivery_provider_unavailable";
pub const REASON_REQUEST_REJECTED: &str = "delivery_request_rejected";
pub const REASON_TRANSPORT_FAILED: &str = "delivery_transport_failed";
pub const REASON_INVALID_RESPONSE: &str = "delivery_invalid_response";

/// Failure reported by a chat transport call.
#[derive(Debug, Clone, Error)]
#[error("reason_code={reason_code} retryable={retryable} status={http_status:?} detail={detail}")]
pub struct ChatTransportError {
    pub reason_code: String,
    pub detail: String,
    pub retryable: bool,
    pub http_status: Option<u16>,
    pub retry_after_ms: Option<u64>,
}

impl ChatTransportError {
    pub fn new(reason_code: impl Into<String>, detail: impl Into<String>, retryable: bool) -> Self {
        Self {
            reason_code: reason_code.into(),
            detail: detail.into(),
            retryable,
            http_status: None,
            retry_after_ms: None,
        }
    }

    pub fn with_status(mut self, http_status: u16) -> Self {
        self.http_status = Some(http_status);
        self
    }

    pub fn with_retry_after_ms(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }

    /// Maps an HTTP failure status onto a reason code and retry decision.
    pub fn from_status(http_status: u16, detail: impl Into<String>) -> Self {
        let (reason_code, retryable) = match http_status {
            429 => (REASON_RATE_LIMITED, true),
            500..=599 => (REASON_PROVIDER_UNAVAILABLE, true),
            400..=499 => (REASON_REQUEST_REJECTED, false),
            _ => (REASON_TRANSPORT_FAILED, true),
        };
        Self::new(reason_code, detail, retryable).with_status(http_status)
    }

    /// The edit carried the content already shown; treated as success by callers.
    pub fn is_not_modified(&self) -> bool {
        self.reason_code == REASON_NOT_MODIFIED
    }
}

impl RetryableError for ChatTransportError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends a message, optionally into a forum topic, and returns its id.
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&InlineKeyboard>,
        thread_id: Option<ThreadId>,
    ) -> Result<MessageId, ChatTransportError>;

    /// Replaces the text and keyboard of an existing message.
    async fn edit_message(
        &self,
        target: MessageRef,
        text: &str,
        markup: Option<&InlineKeyboard>,
    ) -> Result<(), ChatTransportError>;
}
