//! Counter-synchronization core for the tally bot.
//!
//! Inbound messages flow through the classifier into the counter store, which
//! applies each delta in memory, mirrors it to the ledger and compensates on
//! failure. Display sync then reconciles the single inline-keyboard control
//! with the latest snapshot.

pub mod classifier;
pub mod commands;
pub mod counter_store;
pub mod dedupe;
pub mod dispatcher;
pub mod display_sync;
pub mod report;
pub mod transport;

pub use classifier::{classify, Classification, IgnoreReason};
pub use commands::{bot_command_usage, parse_bot_command, BotCommand, ReportWindow};
pub use counter_store::{CounterError, CounterSnapshot, CounterStore};
pub use dedupe::ProcessedMessages;
pub use dispatcher::{CounterBot, CounterBotConfig, DispatchOutcome};
pub use display_sync::{render_counter_control, DisplaySync, RenderOutcome};
pub use report::{aggregate_report, DailyTally, ReportAggregate, ReportRenderer, TextReportRenderer};
pub use transport::{ChatTransport, ChatTransportError};

#[cfg(test)]
pub(crate) mod test_support;
