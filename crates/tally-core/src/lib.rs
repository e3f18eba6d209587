//! Foundational types shared across tally crates.
//!
//! Provides chat identifiers, the tracked-participant binding, normalized
//! inbound message events, inline keyboard markup, calendar-day helpers and
//! the bounded retry combinator used around outbound render calls.

pub mod ids;
pub mod inbound;
pub mod markup;
pub mod participants;
pub mod retry;
pub mod time_utils;

pub use ids::{ChatId, MessageId, MessageRef, ThreadId, ThreadRef, UserId};
pub use inbound::{InboundMessage, MessageKind};
pub use markup::{InlineButton, InlineKeyboard};
pub use participants::{Participant, ParticipantBinding, TrackedParticipants};
pub use retry::{retry_with_backoff, RetryPolicy, RetryableError};
pub use time_utils::{calendar_day, DayRange};

