//! Report aggregation over ledger rows and the default text renderer.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use tally_core::{Participant, TrackedParticipants};
use tally_ledger::LedgerEntry;

use crate::commands::ReportWindow;

const TREND_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTally {
    pub day: NaiveDate,
    pub count_a: i64,
    pub count_b: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportAggregate {
    pub window: ReportWindow,
    pub days: Vec<DailyTally>,
    pub total_a: i64,
    pub total_b: i64,
}

impl ReportAggregate {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Rolling mean over the last three listed days; `None` until enough days exist.
    pub fn trend(&self, participant: Participant) -> Vec<Option<f64>> {
        let series = self
            .days
            .iter()
            .map(|tally| match participant {
                Participant::A => tally.count_a,
                Participant::B => tally.count_b,
            })
            .collect::<Vec<_>>();
        (0..series.len())
            .map(|index| {
                if index + 1 < TREND_WINDOW {
                    return None;
                }
                let window = &series[index + 1 - TREND_WINDOW..=index];
                Some(window.iter().sum::<i64>() as f64 / TREND_WINDOW as f64)
            })
            .collect()
    }
}

/// Groups ledger rows by day for the two tracked participants.
///
/// Rows for untracked users are skipped.
pub fn aggregate_report(
    entries: &[LedgerEntry],
    participants: &TrackedParticipants,
    window: ReportWindow,
) -> ReportAggregate {
    let mut by_day = BTreeMap::<NaiveDate, DailyTally>::new();
    for entry in entries {
        let Some(participant) = participants.resolve(entry.user_id) else {
            continue;
        };
        let tally = by_day.entry(entry.day).or_insert(DailyTally {
            day: entry.day,
            count_a: 0,
            count_b: 0,
        });
        match participant {
            Participant::A => tally.count_a = tally.count_a.saturating_add(entry.count),
            Participant::B => tally.count_b = tally.count_b.saturating_add(entry.count),
        }
    }
    let days = by_day.into_values().collect::<Vec<_>>();
    ReportAggregate {
        window,
        total_a: days
            .iter()
            .map(|tally| tally.count_a)
            .fold(0, i64::saturating_add),
        total_b: days
            .iter()
            .map(|tally| tally.count_b)
            .fold(0, i64::saturating_add),
        days,
    }
}

/// Turns an aggregate into a message body.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, aggregate: &ReportAggregate, participants: &TrackedParticipants) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextReportRenderer;

impl ReportRenderer for TextReportRenderer {
    fn render(&self, aggregate: &ReportAggregate, participants: &TrackedParticipants) -> String {
        let label_a = participants.label(Participant::A);
        let label_b = participants.label(Participant::B);
        let title = format!("Stats for {}", aggregate.window.label());
        if aggregate.is_empty() {
            return format!("{title}\nNo activity recorded.");
        }

        let trend_a = aggregate.trend(Participant::A);
        let trend_b = aggregate.trend(Participant::B);
        let mut lines = vec![title, format!("date   {label_a} / {label_b}   trend")];
        for (index, tally) in aggregate.days.iter().enumerate() {
            let trend = match (trend_a[index], trend_b[index]) {
                (Some(a), Some(b)) => format!("{a:.1} / {b:.1}"),
                _ => "-".to_string(),
            };
            lines.push(format!(
                "{}  {} / {}   {trend}",
                tally.day.format("%d.%m"),
                tally.count_a,
                tally.count_b
            ));
        }
        lines.push(format!(
            "Total: {label_a} {}, {label_b} {}",
            aggregate.total_a, aggregate.total_b
        ));
        lines.join("\n")
    }
}
