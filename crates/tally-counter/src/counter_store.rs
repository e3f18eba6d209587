//! Owned counter state with a ledger mirror and explicit compensation.

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::Mutex;

use tally_core::{DayRange, MessageRef, Participant, ThreadRef, TrackedParticipants};
use tally_ledger::{totals_by_user, Ledger, LedgerError};

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("count for {participant} cannot drop below zero (current {current}, delta {delta:+})")]
    NegativeCount {
        participant: Participant,
        current: i64,
        delta: i64,
    },
    #[error("ledger write for {participant} failed; in-memory change rolled back: {source}")]
    LedgerWrite {
        participant: Participant,
        #[source]
        source: LedgerError,
    },
    #[error("failed to hydrate counters from ledger: {source}")]
    Hydrate {
        #[source]
        source: LedgerError,
    },
}

/// Point-in-time copy of the counter state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub count_a: i64,
    pub count_b: i64,
    pub active_thread: Option<ThreadRef>,
    pub display_target: Option<MessageRef>,
}

impl CounterSnapshot {
    pub fn count(&self, participant: Participant) -> i64 {
        match participant {
            Participant::A => self.count_a,
            Participant::B => self.count_b,
        }
    }

    fn count_mut(&mut self, participant: Participant) -> &mut i64 {
        match participant {
            Participant::A => &mut self.count_a,
            Participant::B => &mut self.count_b,
        }
    }
}

#[derive(Debug, Default)]
struct CounterState {
    snapshot: CounterSnapshot,
    // Positive deltas applied in memory whose ledger write has not finished.
    pending_a: i64,
    pending_b: i64,
}

impl CounterState {
    fn pending_mut(&mut self, participant: Participant) -> &mut i64 {
        match participant {
            Participant::A => &mut self.pending_a,
            Participant::B => &mut self.pending_b,
        }
    }
}

/// Single owner of both counters, the active thread and the display target.
///
/// One mutex guards the whole state. It is never held across a ledger call;
/// the compensating rollback re-acquires it.
pub struct CounterStore {
    state: Mutex<CounterState>,
    ledger: Arc<dyn Ledger>,
    participants: TrackedParticipants,
}

impl CounterStore {
    pub fn new(ledger: Arc<dyn Ledger>, participants: TrackedParticipants) -> Self {
        Self {
            state: Mutex::new(CounterState::default()),
            ledger,
            participants,
        }
    }

    pub fn participants(&self) -> &TrackedParticipants {
        &self.participants
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub async fn snapshot(&self) -> CounterSnapshot {
        self.state.lock().await.snapshot
    }

    pub async fn active_thread(&self) -> Option<ThreadRef> {
        self.state.lock().await.snapshot.active_thread
    }

    /// Rebinds tracking to `thread` and forgets the previous display target.
    pub async fn set_active_thread(&self, thread: ThreadRef) {
        let mut state = self.state.lock().await;
        state.snapshot.active_thread = Some(thread);
        state.snapshot.display_target = None;
        tracing::info!(
            chat_id = %thread.chat_id,
            thread_id = %thread.thread_id,
            "active thread set"
        );
    }

    pub async fn set_display_target(&self, target: MessageRef) {
        self.state.lock().await.snapshot.display_target = Some(target);
    }

    /// Applies `delta` in memory, mirrors it to the ledger row for `day`, and
    /// undoes the in-memory change if the ledger write fails.
    ///
    /// Decrements are validated against the count without increments that are
    /// still being written, so a later rollback can never leave it below zero.
    pub async fn apply_delta(
        &self,
        participant: Participant,
        delta: i64,
        day: NaiveDate,
    ) -> Result<i64, CounterError> {
        let applied = {
            let mut state = self.state.lock().await;
            let current = state.snapshot.count(participant);
            if delta == 0 {
                return Ok(current);
            }
            let pending = *state.pending_mut(participant);
            if current.saturating_sub(pending).saturating_add(delta) < 0 {
                return Err(CounterError::NegativeCount {
                    participant,
                    current,
                    delta,
                });
            }
            let next = current.saturating_add(delta);
            *state.snapshot.count_mut(participant) = next;
            if delta > 0 {
                *state.pending_mut(participant) += delta;
            }
            next
        };

        let user_id = self.participants.user_id(participant);
        let result = self.ledger.increment(user_id, day, delta).await;

        let mut state = self.state.lock().await;
        if delta > 0 {
            *state.pending_mut(participant) -= delta;
        }
        match result {
            Ok(stored) => {
                tracing::debug!(
                    %participant,
                    delta,
                    count = applied,
                    ledger_row = stored,
                    %day,
                    "counter delta applied"
                );
                Ok(applied)
            }
            Err(source) => {
                let reverted = state.snapshot.count(participant).saturating_sub(delta);
                *state.snapshot.count_mut(participant) = reverted;
                tracing::warn!(
                    %participant,
                    delta,
                    count = reverted,
                    backend = self.ledger.backend_name(),
                    error = %source,
                    "ledger write failed; counter delta rolled back"
                );
                Err(CounterError::LedgerWrite {
                    participant,
                    source,
                })
            }
        }
    }

    /// Replaces both counts with the per-participant ledger totals.
    pub async fn hydrate(&self) -> Result<CounterSnapshot, CounterError> {
        let entries = self
            .ledger
            .scan(DayRange::all())
            .await
            .map_err(|source| CounterError::Hydrate { source })?;
        let totals = totals_by_user(&entries);
        let mut state = self.state.lock().await;
        for participant in Participant::ALL {
            let user_id = self.participants.user_id(participant);
            *state.snapshot.count_mut(participant) = totals.get(&user_id).copied().unwrap_or(0);
        }
        tracing::info!(
            backend = self.ledger.backend_name(),
            rows = entries.len(),
            count_a = state.snapshot.count_a,
            count_b = state.snapshot.count_b,
            "counters hydrated from ledger"
        );
        Ok(state.snapshot)
    }
}
