//! Keeps the single counter control message in step with the counter store.

use std::sync::Arc;

use tokio::sync::Mutex;

use tally_core::{retry_with_backoff, InlineKeyboard, MessageRef, RetryPolicy, ThreadRef};

use crate::counter_store::{CounterSnapshot, CounterStore};
use crate::transport::{ChatTransport, ChatTransportError};

pub const CONTROL_TEXT: &str = "Action counter:";
pub const CONTROL_CALLBACK_DATA: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    NoTarget,
    Unchanged,
    Rendered { attempts: usize },
    Failed { reason_code: String },
}

/// Control text plus the inert `"{A}/{B}"` button.
pub fn render_counter_control(snapshot: &CounterSnapshot) -> (String, InlineKeyboard) {
    let label = format!("{}/{}", snapshot.count_a, snapshot.count_b);
    (
        CONTROL_TEXT.to_string(),
        InlineKeyboard::single_button(label, CONTROL_CALLBACK_DATA),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RenderedState {
    target: MessageRef,
    label: String,
}

pub struct DisplaySync {
    store: Arc<CounterStore>,
    transport: Arc<dyn ChatTransport>,
    policy: RetryPolicy,
    // Held for the whole render so snapshots reach the control in order.
    last_rendered: Mutex<Option<RenderedState>>,
}

impl DisplaySync {
    pub fn new(
        store: Arc<CounterStore>,
        transport: Arc<dyn ChatTransport>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            transport,
            policy,
            last_rendered: Mutex::new(None),
        }
    }

    /// Sends a fresh control into `thread` and makes it the display target.
    pub async fn initialize(&self, thread: ThreadRef) -> Result<MessageRef, ChatTransportError> {
        let mut last_rendered = self.last_rendered.lock().await;
        let snapshot = self.store.snapshot().await;
        let (text, markup) = render_counter_control(&snapshot);
        let message_id = self
            .transport
            .send_message(thread.chat_id, &text, Some(&markup), Some(thread.thread_id))
            .await?;
        let target = MessageRef {
            chat_id: thread.chat_id,
            message_id,
        };
        self.store.set_display_target(target).await;
        *last_rendered = Some(RenderedState {
            target,
            label: markup.first_button_text().unwrap_or_default().to_string(),
        });
        tracing::info!(
            chat_id = %target.chat_id,
            message_id = %target.message_id,
            "counter control initialized"
        );
        Ok(target)
    }

    /// Edits the display target to show the latest counts.
    ///
    /// Transient failures are retried per the policy; a terminal failure is
    /// logged and reported in the outcome, never returned as an error.
    pub async fn render(&self) -> RenderOutcome {
        let mut last_rendered = self.last_rendered.lock().await;
        let snapshot = self.store.snapshot().await;
        let Some(target) = snapshot.display_target else {
            return RenderOutcome::NoTarget;
        };
        let (text, markup) = render_counter_control(&snapshot);
        let label = markup.first_button_text().unwrap_or_default().to_string();
        let next = RenderedState { target, label };
        if last_rendered.as_ref() == Some(&next) {
            return RenderOutcome::Unchanged;
        }

        let transport = &self.transport;
        let text = text.as_str();
        let markup = &markup;
        let result = retry_with_backoff(&self.policy, "render_counter_control", |attempt| async move {
            match transport.edit_message(target, text, Some(markup)).await {
                Ok(()) => Ok(attempt),
                Err(error) if error.is_not_modified() => Ok(attempt),
                Err(error) => Err(error),
            }
        })
        .await;

        match result {
            Ok(attempts) => {
                tracing::debug!(label = %next.label, attempts, "counter control rendered");
                *last_rendered = Some(next);
                RenderOutcome::Rendered { attempts }
            }
            Err(error) => {
                tracing::error!(
                    reason_code = %error.reason_code,
                    retryable = error.retryable,
                    detail = %error.detail,
                    "counter control render failed"
                );
                RenderOutcome::Failed {
                    reason_code: error.reason_code,
                }
            }
        }
    }
}
