//! Routes inbound messages to counting or command handling.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;

use tally_core::{calendar_day, InboundMessage, MessageKind, Participant, RetryPolicy};

use crate::classifier::{classify, Classification};
use crate::commands::{bot_command_usage, parse_bot_command, BotCommand, ReportWindow};
use crate::counter_store::{CounterError, CounterStore};
use crate::dedupe::ProcessedMessages;
use crate::display_sync::{DisplaySync, RenderOutcome};
use crate::report::{aggregate_report, ReportRenderer, TextReportRenderer};
use crate::transport::ChatTransport;

pub const DEFAULT_PROCESSED_MESSAGE_CAP: usize = 4_096;

#[derive(Debug, Clone)]
pub struct CounterBotConfig {
    pub timezone: Tz,
    pub bot_username: Option<String>,
    pub processed_message_cap: usize,
    pub render_policy: RetryPolicy,
}

impl Default for CounterBotConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            bot_username: None,
            processed_message_cap: DEFAULT_PROCESSED_MESSAGE_CAP,
            render_policy: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ignored {
        reason: &'static str,
    },
    Duplicate,
    Counted {
        participant: Participant,
        count: i64,
        render: RenderOutcome,
    },
    CountDropped {
        participant: Participant,
    },
    Command {
        name: &'static str,
        succeeded: bool,
    },
}

/// One bot instance: counter store, display sync and command surface.
pub struct CounterBot {
    config: CounterBotConfig,
    store: Arc<CounterStore>,
    display: DisplaySync,
    transport: Arc<dyn ChatTransport>,
    report_renderer: Arc<dyn ReportRenderer>,
    processed: Mutex<ProcessedMessages>,
}

impl CounterBot {
    pub fn new(
        config: CounterBotConfig,
        store: Arc<CounterStore>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let display = DisplaySync::new(store.clone(), transport.clone(), config.render_policy);
        let processed = Mutex::new(ProcessedMessages::new(config.processed_message_cap));
        Self {
            config,
            store,
            display,
            transport,
            report_renderer: Arc::new(TextReportRenderer),
            processed,
        }
    }

    pub fn with_report_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.report_renderer = renderer;
        self
    }

    pub fn store(&self) -> &Arc<CounterStore> {
        &self.store
    }

    pub fn display(&self) -> &DisplaySync {
        &self.display
    }

    /// Handles one inbound message. Never fails; problems are logged and
    /// reflected in the outcome so the ingress loop keeps going.
    pub async fn handle_message(&self, message: InboundMessage) -> DispatchOutcome {
        if message.kind == MessageKind::Command {
            return self.handle_command_message(&message).await;
        }

        let active_thread = self.store.active_thread().await;
        let participant = match classify(&message, active_thread, self.store.participants()) {
            Classification::Accept(participant) => participant,
            Classification::Ignore(reason) => {
                tracing::trace!(
                    update_id = message.update_id,
                    reason = reason.as_str(),
                    "message ignored"
                );
                return DispatchOutcome::Ignored {
                    reason: reason.as_str(),
                };
            }
        };

        let key = message.dedupe_key();
        if !self.processed.lock().await.claim(&key) {
            tracing::debug!(key = %key, "duplicate delivery skipped");
            return DispatchOutcome::Duplicate;
        }

        let day = self.message_day(&message);
        match self.store.apply_delta(participant, 1, day).await {
            Ok(count) => {
                let render = self.display.render().await;
                DispatchOutcome::Counted {
                    participant,
                    count,
                    render,
                }
            }
            Err(error) => {
                self.processed.lock().await.release(&key);
                tracing::warn!(
                    %participant,
                    update_id = message.update_id,
                    %error,
                    "message dropped after counter failure"
                );
                // Another render may have shown the rolled-back value.
                self.display.render().await;
                DispatchOutcome::CountDropped { participant }
            }
        }
    }

    async fn handle_command_message(&self, message: &InboundMessage) -> DispatchOutcome {
        let Some(command) = parse_bot_command(
            &message.text,
            self.config.bot_username.as_deref(),
            self.store.participants(),
        ) else {
            return DispatchOutcome::Ignored {
                reason: "unrecognized_command",
            };
        };

        let key = message.dedupe_key();
        if !self.processed.lock().await.claim(&key) {
            return DispatchOutcome::Duplicate;
        }

        let name = command.as_str();
        tracing::info!(
            command = name,
            chat_id = %message.chat_id,
            update_id = message.update_id,
            "command received"
        );
        let succeeded = match command {
            BotCommand::Help => {
                self.reply(message, &bot_command_usage()).await;
                true
            }
            BotCommand::StartTracking => self.start_tracking(message).await,
            BotCommand::Adjust { participant, delta } => {
                let succeeded = self.adjust(message, participant, delta).await;
                if !succeeded {
                    self.processed.lock().await.release(&key);
                }
                succeeded
            }
            BotCommand::Report { window } => self.report(message, window).await,
            BotCommand::Invalid { message: usage } => {
                self.reply(message, &usage).await;
                false
            }
        };
        DispatchOutcome::Command { name, succeeded }
    }

    async fn start_tracking(&self, message: &InboundMessage) -> bool {
        let Some(thread) = message.thread_ref().filter(|_| message.is_topic_message) else {
            self.reply(
                message,
                "This is not a forum topic. Use /start_actions inside a topic.",
            )
            .await;
            return false;
        };

        self.store.set_active_thread(thread).await;
        match self.display.initialize(thread).await {
            Ok(_) => {
                self.reply(message, "Counter started!").await;
                self.display.render().await;
                true
            }
            Err(error) => {
                tracing::error!(
                    reason_code = %error.reason_code,
                    detail = %error.detail,
                    "failed to post counter control"
                );
                self.reply(message, "Counting is active, but the counter message could not be posted.")
                    .await;
                false
            }
        }
    }

    async fn adjust(&self, message: &InboundMessage, participant: Participant, delta: i64) -> bool {
        let day = self.message_day(message);
        match self.store.apply_delta(participant, delta, day).await {
            Ok(count) => {
                self.reply(
                    message,
                    &format!("Counter {} is now {count}", participant.alias()),
                )
                .await;
                self.display.render().await;
                true
            }
            Err(CounterError::NegativeCount { current, .. }) => {
                self.reply(
                    message,
                    &format!(
                        "Counter {} is {current}; it cannot go below zero.",
                        participant.alias()
                    ),
                )
                .await;
                false
            }
            Err(error) => {
                tracing::warn!(%participant, delta, %error, "manual adjustment failed");
                self.display.render().await;
                self.reply(
                    message,
                    &format!(
                        "Could not save the change for {}; the counter was left unchanged.",
                        participant.alias()
                    ),
                )
                .await;
                false
            }
        }
    }

    async fn report(&self, message: &InboundMessage, window: ReportWindow) -> bool {
        let range = window.day_range(self.message_day(message));
        match self.store.ledger().scan(range).await {
            Ok(entries) => {
                let aggregate = aggregate_report(&entries, self.store.participants(), window);
                let body = self
                    .report_renderer
                    .render(&aggregate, self.store.participants());
                self.reply(message, &body).await;
                true
            }
            Err(error) => {
                tracing::warn!(window = %window.label(), %error, "report scan failed");
                self.reply(message, "Could not load stats right now. Try again later.")
                    .await;
                false
            }
        }
    }

    async fn reply(&self, message: &InboundMessage, text: &str) {
        if let Err(error) = self
            .transport
            .send_message(message.chat_id, text, None, message.thread_id)
            .await
        {
            tracing::warn!(
                chat_id = %message.chat_id,
                reason_code = %error.reason_code,
                detail = %error.detail,
                "reply failed"
            );
        }
    }

    /// Calendar day of the message in the configured timezone.
    fn message_day(&self, message: &InboundMessage) -> NaiveDate {
        let instant = DateTime::<Utc>::from_timestamp(message.timestamp_unix, 0)
            .filter(|_| message.timestamp_unix > 0)
            .unwrap_or_else(Utc::now);
        calendar_day(instant, self.config.timezone)
    }
}
