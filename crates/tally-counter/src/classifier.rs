//! Pure classification of inbound messages against the active thread.

use tally_core::{InboundMessage, Participant, ThreadRef, TrackedParticipants};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoActiveThread,
    OutsideActiveThread,
    NotContent,
    MissingAuthor,
    UntrackedAuthor,
}

impl IgnoreReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoActiveThread => "no_active_thread",
            Self::OutsideActiveThread => "outside_active_thread",
            Self::NotContent => "not_content",
            Self::MissingAuthor => "missing_author",
            Self::UntrackedAuthor => "untracked_author",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Accept(Participant),
    Ignore(IgnoreReason),
}

/// Decides whether `message` counts toward a tracked participant.
///
/// A message counts only when a thread is active, the message was posted in
/// that exact `(chat, thread)`, it is plain text and its author is bound.
pub fn classify(
    message: &InboundMessage,
    active_thread: Option<ThreadRef>,
    participants: &TrackedParticipants,
) -> Classification {
    let Some(active_thread) = active_thread else {
        return Classification::Ignore(IgnoreReason::NoActiveThread);
    };
    if message.thread_ref() != Some(active_thread) {
        return Classification::Ignore(IgnoreReason::OutsideActiveThread);
    }
    if !message.kind.is_content() {
        return Classification::Ignore(IgnoreReason::NotContent);
    }
    let Some(author_id) = message.author_id else {
        return Classification::Ignore(IgnoreReason::MissingAuthor);
    };
    match participants.resolve(author_id) {
        Some(participant) => Classification::Accept(participant),
        None => Classification::Ignore(IgnoreReason::UntrackedAuthor),
    }
}
