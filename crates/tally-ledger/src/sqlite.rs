//! SQLite-backed `Ledger` with an atomic upsert increment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::{Ledger, LedgerEntry, LedgerError, LedgerResult};
use tally_core::{DayRange, UserId};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Persistent SQLite ledger stored in a single `actions` table.
#[derive(Debug)]
pub struct SqliteLedger {
    db_path: PathBuf,
}

impl SqliteLedger {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    pub fn new(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let ledger = Self { db_path };
        let connection = ledger.open_connection()?;
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS actions (
                user_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                count INTEGER NOT NULL,
                PRIMARY KEY (user_id, date)
            );
            "#,
        )?;
        Ok(ledger)
    }

    fn open_connection(&self) -> LedgerResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(connection)
    }
}

fn day_to_db(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

fn day_from_db(raw: String) -> LedgerResult<NaiveDate> {
    NaiveDate::parse_from_str(&raw, DAY_FORMAT).map_err(|_| LedgerError::InvalidPersistedValue {
        field: "date",
        value: raw,
    })
}

#[async_trait]
impl Ledger for SqliteLedger {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, user_id: UserId, day: NaiveDate) -> LedgerResult<Option<i64>> {
        let connection = self.open_connection()?;
        let count = connection
            .query_row(
                "SELECT count FROM actions WHERE user_id = ?1 AND date = ?2",
                params![user_id.0, day_to_db(day)],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(count)
    }

    async fn insert(&self, entry: LedgerEntry) -> LedgerResult<()> {
        let connection = self.open_connection()?;
        let inserted = connection.execute(
            "INSERT INTO actions (user_id, date, count) VALUES (?1, ?2, ?3) ON CONFLICT DO NOTHING",
            params![entry.user_id.0, day_to_db(entry.day), entry.count],
        )?;
        if inserted == 0 {
            return Err(LedgerError::AlreadyExists {
                user_id: entry.user_id,
                day: entry.day,
            });
        }
        Ok(())
    }

    async fn update(&self, user_id: UserId, day: NaiveDate, count: i64) -> LedgerResult<()> {
        let connection = self.open_connection()?;
        let updated = connection.execute(
            "UPDATE actions SET count = ?3 WHERE user_id = ?1 AND date = ?2",
            params![user_id.0, day_to_db(day), count],
        )?;
        if updated == 0 {
            return Err(LedgerError::NotFound { user_id, day });
        }
        Ok(())
    }

    async fn scan(&self, range: DayRange) -> LedgerResult<Vec<LedgerEntry>> {
        let connection = self.open_connection()?;
        let start = range.start.map(day_to_db);
        let end = range.end.map(day_to_db);
        let mut statement = connection.prepare(
            r#"
            SELECT user_id, date, count FROM actions
            WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date <= ?2)
            ORDER BY date ASC, user_id ASC
            "#,
        )?;
        let rows = statement.query_map(params![start, end], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (user_id, raw_day, count) = row?;
            entries.push(LedgerEntry {
                user_id: UserId(user_id),
                day: day_from_db(raw_day)?,
                count,
            });
        }
        Ok(entries)
    }

    async fn increment(&self, user_id: UserId, day: NaiveDate, delta: i64) -> LedgerResult<i64> {
        let connection = self.open_connection()?;
        let count = connection.query_row(
            r#"
            INSERT INTO actions (user_id, date, count) VALUES (?1, ?2, ?3)
            ON CONFLICT (user_id, date) DO UPDATE SET count = count + excluded.count
            RETURNING count
            "#,
            params![user_id.0, day_to_db(day), delta],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use tally_core::{DayRange, UserId};

    use super::SqliteLedger;
    use crate::{Ledger, LedgerEntry, LedgerError};

    fn day(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    #[tokio::test]
    async fn functional_sqlite_ledger_round_trips_rows_across_reopen() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ledger").join("tally.sqlite");
        {
            let ledger = SqliteLedger::new(&path).expect("open");
            ledger
                .insert(LedgerEntry {
                    user_id: UserId(1),
                    day: day("2024-01-01"),
                    count: 3,
                })
                .await
                .expect("insert");
            assert_eq!(
                ledger
                    .increment(UserId(1), day("2024-01-02"), 2)
                    .await
                    .expect("increment"),
                2
            );
        }

        let reopened = SqliteLedger::new(&path).expect("reopen");
        let rows = reopened.scan(DayRange::all()).await.expect("scan");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].day, day("2024-01-01"));
        assert_eq!(rows[1].count, 2);
    }

    #[tokio::test]
    async fn unit_sqlite_insert_and_update_report_key_conflicts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ledger = SqliteLedger::new(temp.path().join("tally.sqlite")).expect("open");
        let entry = LedgerEntry {
            user_id: UserId(4),
            day: day("2024-03-01"),
            count: 1,
        };
        ledger.insert(entry.clone()).await.expect("insert");
        assert!(matches!(
            ledger.insert(entry).await,
            Err(LedgerError::AlreadyExists { .. })
        ));
        assert!(matches!(
            ledger.update(UserId(5), day("2024-03-01"), 2).await,
            Err(LedgerError::NotFound { .. })
        ));
        ledger
            .update(UserId(4), day("2024-03-01"), 9)
            .await
            .expect("update");
        assert_eq!(
            ledger.get(UserId(4), day("2024-03-01")).await.expect("get"),
            Some(9)
        );
    }

    #[tokio::test]
    async fn functional_sqlite_scan_honors_open_and_closed_bounds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ledger = SqliteLedger::new(temp.path().join("tally.sqlite")).expect("open");
        for (raw_day, count) in [("2024-01-01", 1), ("2024-01-05", 2), ("2024-01-09", 3)] {
            ledger
                .increment(UserId(1), day(raw_day), count)
                .await
                .expect("seed");
        }
        let bounded = ledger
            .scan(DayRange::between(day("2024-01-02"), day("2024-01-09")))
            .await
            .expect("bounded");
        assert_eq!(
            bounded.iter().map(|row| row.count).collect::<Vec<_>>(),
            vec![2, 3]
        );
        let open = ledger
            .scan(DayRange::since(day("2024-01-05")))
            .await
            .expect("open");
        assert_eq!(open.len(), 2);
    }

    #[tokio::test]
    async fn integration_sqlite_concurrent_increments_are_not_lost() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ledger = Arc::new(SqliteLedger::new(temp.path().join("tally.sqlite")).expect("open"));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.increment(UserId(1), day("2024-01-01"), 1).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("increment");
        }
        assert_eq!(
            ledger.get(UserId(1), day("2024-01-01")).await.expect("get"),
            Some(16)
        );
    }
}
