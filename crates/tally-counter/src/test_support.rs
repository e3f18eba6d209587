use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;

use tally_core::{
    ChatId, InboundMessage, InlineKeyboard, MessageId, MessageKind, MessageRef, ParticipantBinding,
    ThreadId, TrackedParticipants, UserId, DayRange,
};
use tally_ledger::{InMemoryLedger, Ledger, LedgerEntry, LedgerError, LedgerResult};

use crate::transport::{ChatTransport, ChatTransportError};

pub(crate) const PARTICIPANT_A_ID: i64 = 424_546_089;
pub(crate) const PARTICIPANT_B_ID: i64 = 1_181_433_072;
/// 2024-01-01T12:00:00Z
pub(crate) const NOON_2024_01_01: i64 = 1_704_110_400;

pub(crate) fn participants() -> TrackedParticipants {
    TrackedParticipants::new(
        ParticipantBinding {
            user_id: UserId(PARTICIPANT_A_ID),
            label: "Friend".to_string(),
        },
        ParticipantBinding {
            user_id: UserId(PARTICIPANT_B_ID),
            label: "Me".to_string(),
        },
    )
}

pub(crate) fn day(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
}

pub(crate) fn message_from(author: i64, chat: i64, thread: i64) -> InboundMessage {
    InboundMessage {
        update_id: 1,
        chat_id: ChatId(chat),
        message_id: MessageId(100),
        thread_id: Some(ThreadId(thread)),
        is_topic_message: true,
        author_id: Some(UserId(author)),
        kind: MessageKind::Text,
        text: "hello".to_string(),
        timestamp_unix: NOON_2024_01_01,
    }
}

/// Ledger whose writes can be switched to fail.
#[derive(Default)]
pub(crate) struct FlakyLedger {
    pub(crate) inner: InMemoryLedger,
    pub(crate) fail_writes: AtomicBool,
    pub(crate) fail_scans: AtomicBool,
}

impl FlakyLedger {
    pub(crate) fn failing() -> Self {
        let ledger = Self::default();
        ledger.fail_writes.store(true, Ordering::SeqCst);
        ledger
    }

    fn rejected(operation: &'static str) -> LedgerError {
        LedgerError::Rejected {
            operation,
            status: 503,
            detail: "ledger offline".to_string(),
        }
    }
}

#[async_trait]
impl Ledger for FlakyLedger {
    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    async fn get(&self, user_id: UserId, day: NaiveDate) -> LedgerResult<Option<i64>> {
        self.inner.get(user_id, day).await
    }

    async fn insert(&self, entry: LedgerEntry) -> LedgerResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::rejected("insert"));
        }
        self.inner.insert(entry).await
    }

    async fn update(&self, user_id: UserId, day: NaiveDate, count: i64) -> LedgerResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::rejected("update"));
        }
        self.inner.update(user_id, day, count).await
    }

    async fn scan(&self, range: DayRange) -> LedgerResult<Vec<LedgerEntry>> {
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(Self::rejected("scan"));
        }
        self.inner.scan(range).await
    }

    async fn increment(&self, user_id: UserId, day: NaiveDate, delta: i64) -> LedgerResult<i64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::rejected("increment"));
        }
        self.inner.increment(user_id, day, delta).await
    }
}

/// Ledger that parks positive increments for one user until released, then
/// fails them when `fail_gated` is set.
pub(crate) struct GatedLedger {
    pub(crate) inner: InMemoryLedger,
    gated_user: UserId,
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
    pub(crate) fail_gated: AtomicBool,
}

impl GatedLedger {
    pub(crate) fn new(gated_user: i64) -> Self {
        Self {
            inner: InMemoryLedger::new(),
            gated_user: UserId(gated_user),
            entered: Notify::new(),
            release: Notify::new(),
            fail_gated: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Ledger for GatedLedger {
    fn backend_name(&self) -> &'static str {
        "gated"
    }

    async fn get(&self, user_id: UserId, day: NaiveDate) -> LedgerResult<Option<i64>> {
        self.inner.get(user_id, day).await
    }

    async fn insert(&self, entry: LedgerEntry) -> LedgerResult<()> {
        self.inner.insert(entry).await
    }

    async fn update(&self, user_id: UserId, day: NaiveDate, count: i64) -> LedgerResult<()> {
        self.inner.update(user_id, day, count).await
    }

    async fn scan(&self, range: DayRange) -> LedgerResult<Vec<LedgerEntry>> {
        self.inner.scan(range).await
    }

    async fn increment(&self, user_id: UserId, day: NaiveDate, delta: i64) -> LedgerResult<i64> {
        if user_id == self.gated_user && delta > 0 {
            self.entered.notify_one();
            self.release.notified().await;
            if self.fail_gated.load(Ordering::SeqCst) {
                return Err(FlakyLedger::rejected("increment"));
            }
        }
        self.inner.increment(user_id, day, delta).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SentMessage {
    pub(crate) chat_id: ChatId,
    pub(crate) thread_id: Option<ThreadId>,
    pub(crate) text: String,
    pub(crate) markup: Option<InlineKeyboard>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EditedMessage {
    pub(crate) target: MessageRef,
    pub(crate) text: String,
    pub(crate) markup: Option<InlineKeyboard>,
}

/// Records outbound calls; edit failures are scripted up front.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    pub(crate) sent: Mutex<Vec<SentMessage>>,
    pub(crate) edits: Mutex<Vec<EditedMessage>>,
    pub(crate) edit_attempts: AtomicUsize,
    pub(crate) scripted_edit_failures: Mutex<VecDeque<ChatTransportError>>,
    next_message_id: AtomicUsize,
}

impl RecordingTransport {
    pub(crate) fn fail_next_edits(&self, failures: impl IntoIterator<Item = ChatTransportError>) {
        self.scripted_edit_failures
            .lock()
            .expect("failures lock")
            .extend(failures);
    }

    pub(crate) fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub(crate) fn edits(&self) -> Vec<EditedMessage> {
        self.edits.lock().expect("edits lock").clone()
    }

    pub(crate) fn last_button(&self) -> Option<String> {
        self.edits()
            .last()
            .and_then(|edit| edit.markup.as_ref())
            .and_then(|markup| markup.first_button_text())
            .map(str::to_string)
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<&InlineKeyboard>,
        thread_id: Option<ThreadId>,
    ) -> Result<MessageId, ChatTransportError> {
        self.sent.lock().expect("sent lock").push(SentMessage {
            chat_id,
            thread_id,
            text: text.to_string(),
            markup: markup.cloned(),
        });
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 500;
        Ok(MessageId(id as i64))
    }

    async fn edit_message(
        &self,
        target: MessageRef,
        text: &str,
        markup: Option<&InlineKeyboard>,
    ) -> Result<(), ChatTransportError> {
        self.edit_attempts.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .scripted_edit_failures
            .lock()
            .expect("failures lock")
            .pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }
        self.edits.lock().expect("edits lock").push(EditedMessage {
            target,
            text: text.to_string(),
            markup: markup.cloned(),
        });
        Ok(())
    }
}
