//! Durable per-day, per-participant counter ledger.
//!
//! The `Ledger` trait is the contract the counter store mirrors into. Rows are
//! keyed by `(user_id, day)` and additive. Backends: in-memory (dry runs and
//! tests), SQLite, and a PostgREST table such as a hosted Supabase project.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use tally_core::{DayRange, UserId};

mod postgrest;
mod sqlite;

pub use postgrest::{PostgrestLedger, PostgrestLedgerConfig};
pub use sqlite::SqliteLedger;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors returned by ledger backends.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger row for user {user_id} on {day} already exists")]
    AlreadyExists { user_id: UserId, day: NaiveDate },
    #[error("ledger row for user {user_id} on {day} not found")]
    NotFound { user_id: UserId, day: NaiveDate },
    #[error("ledger {operation} rejected with status {status}: {detail}")]
    Rejected {
        operation: &'static str,
        status: u16,
        detail: String,
    },
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One persisted `(user, day) -> count` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub user_id: UserId,
    #[serde(rename = "date")]
    pub day: NaiveDate,
    pub count: i64,
}

/// Async ledger contract consumed by the counter store and report command.
#[async_trait]
pub trait Ledger: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn get(&self, user_id: UserId, day: NaiveDate) -> LedgerResult<Option<i64>>;
    async fn insert(&self, entry: LedgerEntry) -> LedgerResult<()>;
    async fn update(&self, user_id: UserId, day: NaiveDate, count: i64) -> LedgerResult<()>;
    async fn scan(&self, range: DayRange) -> LedgerResult<Vec<LedgerEntry>>;

    /// Adds `delta` to the `(user_id, day)` row, creating it with `count = delta`
    /// when absent. Returns the stored count afterwards.
    ///
    /// Implementations must not lose concurrent increments issued through the
    /// same ledger instance.
    async fn increment(&self, user_id: UserId, day: NaiveDate, delta: i64) -> LedgerResult<i64>;
}

/// Read-modify-write increment built from the primitive operations.
///
/// Callers must serialize concurrent invocations for the same ledger; an insert
/// that loses a race against another writer falls back to one update.
pub async fn increment_with_primitives<L>(
    ledger: &L,
    user_id: UserId,
    day: NaiveDate,
    delta: i64,
) -> LedgerResult<i64>
where
    L: Ledger + ?Sized,
{
    if let Some(current) = ledger.get(user_id, day).await? {
        let next = current.saturating_add(delta);
        ledger.update(user_id, day, next).await?;
        return Ok(next);
    }

    match ledger
        .insert(LedgerEntry {
            user_id,
            day,
            count: delta,
        })
        .await
    {
        Ok(()) => Ok(delta),
        Err(LedgerError::AlreadyExists { .. }) => {
            let current = ledger
                .get(user_id, day)
                .await?
                .ok_or(LedgerError::NotFound { user_id, day })?;
            let next = current.saturating_add(delta);
            ledger.update(user_id, day, next).await?;
            Ok(next)
        }
        Err(error) => Err(error),
    }
}

/// Sums entries per user across every day.
pub fn totals_by_user(entries: &[LedgerEntry]) -> HashMap<UserId, i64> {
    let mut totals = HashMap::new();
    for entry in entries {
        let total = totals.entry(entry.user_id).or_insert(0_i64);
        *total = total.saturating_add(entry.count);
    }
    totals
}

/// Process-local ledger used for dry runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    rows: RwLock<BTreeMap<(UserId, NaiveDate), i64>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let rows = entries
            .into_iter()
            .map(|entry| ((entry.user_id, entry.day), entry.count))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, user_id: UserId, day: NaiveDate) -> LedgerResult<Option<i64>> {
        Ok(self.rows.read().await.get(&(user_id, day)).copied())
    }

    async fn insert(&self, entry: LedgerEntry) -> LedgerResult<()> {
        let mut rows = self.rows.write().await;
        let key = (entry.user_id, entry.day);
        if rows.contains_key(&key) {
            return Err(LedgerError::AlreadyExists {
                user_id: entry.user_id,
                day: entry.day,
            });
        }
        rows.insert(key, entry.count);
        Ok(())
    }

    async fn update(&self, user_id: UserId, day: NaiveDate, count: i64) -> LedgerResult<()> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&(user_id, day)) {
            Some(stored) => {
                *stored = count;
                Ok(())
            }
            None => Err(LedgerError::NotFound { user_id, day }),
        }
    }

    async fn scan(&self, range: DayRange) -> LedgerResult<Vec<LedgerEntry>> {
        let rows = self.rows.read().await;
        let mut entries = rows
            .iter()
            .filter(|((_, day), _)| range.contains(*day))
            .map(|((user_id, day), count)| LedgerEntry {
                user_id: *user_id,
                day: *day,
                count: *count,
            })
            .collect::<Vec<_>>();
        entries.sort_by(|left, right| (left.day, left.user_id).cmp(&(right.day, right.user_id)));
        Ok(entries)
    }

    async fn increment(&self, user_id: UserId, day: NaiveDate, delta: i64) -> LedgerResult<i64> {
        let mut rows = self.rows.write().await;
        let stored = rows.entry((user_id, day)).or_insert(0);
        *stored = stored.saturating_add(delta);
        Ok(*stored)
    }
}
