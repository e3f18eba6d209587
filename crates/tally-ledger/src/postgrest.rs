//! PostgREST ledger backend (hosted Supabase `actions` table).
//!
//! PostgREST offers no in-place increment without a server-side function, so
//! `increment` runs the read-modify-write under a ledger-local write lock. The
//! lock serializes every writer in this process; a racing insert from another
//! process surfaces as `409 Conflict` and falls back to one update.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::{increment_with_primitives, Ledger, LedgerEntry, LedgerError, LedgerResult};
use tally_core::{DayRange, UserId};

const SCAN_PAGE_SIZE: usize = 1_000;

#[derive(Debug, Clone)]
pub struct PostgrestLedgerConfig {
    pub base_url: String,
    pub api_key: String,
    pub table: String,
    pub request_timeout_ms: u64,
}

impl Default for PostgrestLedgerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            table: "actions".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: i64,
}

pub struct PostgrestLedger {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    write_lock: Mutex<()>,
}

impl PostgrestLedger {
    pub fn new(config: PostgrestLedgerConfig) -> LedgerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}/rest/v1/{}",
                config.base_url.trim().trim_end_matches('/'),
                config.table.trim()
            ),
            api_key: config.api_key.trim().to_string(),
            write_lock: Mutex::new(()),
        })
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint.as_str())
            .header("apikey", self.api_key.as_str())
            .bearer_auth(self.api_key.as_str())
    }

    async fn scan_page(
        &self,
        range: DayRange,
        offset: usize,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let mut query = vec![
            ("select".to_string(), "user_id,date,count".to_string()),
            ("order".to_string(), "date.asc,user_id.asc".to_string()),
            ("limit".to_string(), SCAN_PAGE_SIZE.to_string()),
            ("offset".to_string(), offset.to_string()),
        ];
        if let Some(start) = range.start {
            query.push(("date".to_string(), format!("gte.{start}")));
        }
        if let Some(end) = range.end {
            query.push(("date".to_string(), format!("lte.{end}")));
        }
        let response = self
            .request(reqwest::Method::GET)
            .query(&query)
            .send()
            .await?;
        let response = ensure_success("scan", response).await?;
        Ok(response.json::<Vec<LedgerEntry>>().await?)
    }
}

async fn ensure_success(operation: &'static str, response: Response) -> LedgerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LedgerError::Rejected {
        operation,
        status: status.as_u16(),
        detail: truncate_detail(&body),
    })
}

fn truncate_detail(raw: &str) -> String {
    const LIMIT: usize = 512;
    let trimmed = raw.trim();
    if trimmed.chars().count() <= LIMIT {
        return trimmed.to_string();
    }
    let mut output = trimmed.chars().take(LIMIT).collect::<String>();
    output.push_str("...");
    output
}

#[async_trait]
impl Ledger for PostgrestLedger {
    fn backend_name(&self) -> &'static str {
        "postgrest"
    }

    async fn get(&self, user_id: UserId, day: NaiveDate) -> LedgerResult<Option<i64>> {
        let response = self
            .request(reqwest::Method::GET)
            .query(&[
                ("select", "count".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("date", format!("eq.{day}")),
            ])
            .send()
            .await?;
        let response = ensure_success("get", response).await?;
        let rows = response.json::<Vec<CountRow>>().await?;
        Ok(rows.first().map(|row| row.count))
    }

    async fn insert(&self, entry: LedgerEntry) -> LedgerResult<()> {
        let response = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=minimal")
            .json(&entry)
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(LedgerError::AlreadyExists {
                user_id: entry.user_id,
                day: entry.day,
            });
        }
        ensure_success("insert", response).await?;
        Ok(())
    }

    async fn update(&self, user_id: UserId, day: NaiveDate, count: i64) -> LedgerResult<()> {
        let response = self
            .request(reqwest::Method::PATCH)
            .header("Prefer", "return=representation")
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("date", format!("eq.{day}")),
            ])
            .json(&json!({ "count": count }))
            .send()
            .await?;
        let response = ensure_success("update", response).await?;
        let rows = response.json::<Vec<CountRow>>().await?;
        if rows.is_empty() {
            return Err(LedgerError::NotFound { user_id, day });
        }
        Ok(())
    }

    async fn scan(&self, range: DayRange) -> LedgerResult<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        loop {
            let page = self.scan_page(range, entries.len()).await?;
            let page_len = page.len();
            entries.extend(page);
            if page_len < SCAN_PAGE_SIZE {
                break;
            }
        }
        Ok(entries)
    }

    async fn increment(&self, user_id: UserId, day: NaiveDate, delta: i64) -> LedgerResult<i64> {
        let _guard = self.write_lock.lock().await;
        let count = increment_with_primitives(self, user_id, day, delta).await?;
        tracing::debug!(%user_id, %day, delta, count, "postgrest ledger row updated");
        Ok(count)
    }
}
