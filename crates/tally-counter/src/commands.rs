//! Bot command parsing and usage text.

use chrono::{Datelike, Duration, NaiveDate};

use tally_core::{DayRange, Participant, TrackedParticipants};

const DAY_FORMAT: &str = "%Y-%m-%d";
const ADJUST_USAGE: &str = "Usage: /edit_count <friend|me> <signed number>";
const REPORT_USAGE: &str = "Usage: /stats_counter [week|month|all|YYYY-MM-DD [YYYY-MM-DD]]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    Week,
    Month,
    All,
    Custom {
        start: NaiveDate,
        end: Option<NaiveDate>,
    },
}

impl ReportWindow {
    pub fn label(&self) -> String {
        match self {
            Self::Week => "week".to_string(),
            Self::Month => "month".to_string(),
            Self::All => "all time".to_string(),
            Self::Custom { start, end: Some(end) } => format!("{start} .. {end}"),
            Self::Custom { start, end: None } => format!("{start} .. today"),
        }
    }

    /// Inclusive ledger window relative to `today`.
    pub fn day_range(&self, today: NaiveDate) -> DayRange {
        match self {
            Self::Week => DayRange::since(today - Duration::days(7)),
            Self::Month => DayRange::since(today.with_day(1).unwrap_or(today)),
            Self::All => DayRange::all(),
            Self::Custom { start, end } => DayRange::between(*start, end.unwrap_or(today)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Help,
    StartTracking,
    Adjust {
        participant: Participant,
        delta: i64,
    },
    Report {
        window: ReportWindow,
    },
    Invalid {
        message: String,
    },
}

impl BotCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::StartTracking => "start_tracking",
            Self::Adjust { .. } => "adjust",
            Self::Report { .. } => "report",
            Self::Invalid { .. } => "invalid",
        }
    }
}

pub fn bot_command_usage() -> String {
    [
        "Hi! I count messages in one forum topic.",
        "",
        "/start_actions - start counting in the current topic",
        "/edit_count <friend|me> <signed number> - correct a counter by hand",
        "/stats_counter [week|month|all|YYYY-MM-DD [YYYY-MM-DD]] - activity report",
        "/help - show this message",
    ]
    .join("\n")
}

/// Parses `text` into a command for this bot.
///
/// Returns `None` for plain text, unknown commands and commands addressed to
/// another bot via `/cmd@other_bot`.
pub fn parse_bot_command(
    text: &str,
    bot_username: Option<&str>,
    participants: &TrackedParticipants,
) -> Option<BotCommand> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }
    let mut pieces = trimmed.split_whitespace();
    let head = pieces.next()?;
    let args = pieces.collect::<Vec<_>>();

    let (name, addressee) = match head[1..].split_once('@') {
        Some((name, addressee)) => (name, Some(addressee)),
        None => (&head[1..], None),
    };
    if let (Some(addressee), Some(bot_username)) = (addressee, bot_username) {
        let bot_username = bot_username.trim_start_matches('@');
        if !addressee.eq_ignore_ascii_case(bot_username) {
            return None;
        }
    }

    let parsed = match name.to_ascii_lowercase().as_str() {
        "start" | "help" => BotCommand::Help,
        "start_actions" | "start_tracking" => BotCommand::StartTracking,
        "edit_count" | "adjust" => parse_adjust(&args, participants),
        "stats_counter" | "report" => parse_report(&args),
        _ => return None,
    };
    Some(parsed)
}

fn parse_adjust(args: &[&str], participants: &TrackedParticipants) -> BotCommand {
    let [who, raw_delta] = args else {
        return BotCommand::Invalid {
            message: ADJUST_USAGE.to_string(),
        };
    };
    let Some(participant) = participants.parse_name(who) else {
        return BotCommand::Invalid {
            message: format!(
                "Unknown participant '{who}'. Use '{}' or '{}'.",
                Participant::A.alias(),
                Participant::B.alias()
            ),
        };
    };
    match raw_delta.trim_start_matches('+').parse::<i64>() {
        Ok(delta) => BotCommand::Adjust { participant, delta },
        Err(_) => BotCommand::Invalid {
            message: format!("'{raw_delta}' is not a whole number. {ADJUST_USAGE}"),
        },
    }
}

fn parse_report(args: &[&str]) -> BotCommand {
    let window = match args {
        [] | ["week"] => ReportWindow::Week,
        ["month"] => ReportWindow::Month,
        ["all"] => ReportWindow::All,
        [start] => match parse_day(start) {
            Some(start) => ReportWindow::Custom { start, end: None },
            None => return invalid_date(),
        },
        [start, end] => match (parse_day(start), parse_day(end)) {
            (Some(start), Some(end)) if start <= end => ReportWindow::Custom {
                start,
                end: Some(end),
            },
            (Some(_), Some(_)) => {
                return BotCommand::Invalid {
                    message: "Report start date must not be after the end date.".to_string(),
                }
            }
            _ => return invalid_date(),
        },
        _ => {
            return BotCommand::Invalid {
                message: REPORT_USAGE.to_string(),
            }
        }
    };
    BotCommand::Report { window }
}

fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, DAY_FORMAT).ok()
}

fn invalid_date() -> BotCommand {
    BotCommand::Invalid {
        message: "Invalid date format. Use YYYY-MM-DD.".to_string(),
    }
}
