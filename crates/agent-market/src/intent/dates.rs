//! Calendar logic for relative and explicit dates
//!
//! Trading days are approximated as weekdays; no holiday calendar is used.

use std::sync::LazyLock;

use chrono::{Datelike, Days, Local, NaiveDate, Weekday};
use regex::Regex;

use super::DateRange;

/// Relative-day keywords, checked in order
const RELATIVE_DAYS: [(&str, u64); 8] = [
    ("오늘", 0),
    ("어제", 1),
    ("그저께", 2),
    ("3일 전", 3),
    ("4일 전", 4),
    ("5일 전", 5),
    ("6일 전", 6),
    ("일주일 전", 7),
];

const YESTERDAY: &str = "어제";
const DAY_BEFORE_YESTERDAY: &str = "그저께";

static LAST_WEEK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"지난주\s*(월|화|수|목|금|토|일)요일").expect("last-week pattern is valid")
});

static EXPLICIT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[-./](\d{1,2})[-./](\d{1,2})").expect("date pattern is valid")
});

/// Source of "today"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Today {
    /// Local system clock
    #[default]
    System,
    /// Pinned date, for replays and tests
    Fixed(NaiveDate),
}

impl Today {
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::System => Local::now().date_naive(),
            Self::Fixed(date) => *date,
        }
    }
}

/// A date or range found in text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSpec {
    Single(NaiveDate),
    Range(DateRange),
}

/// Roll a weekend date back to the preceding Friday
pub fn trading_day_adjust(date: NaiveDate) -> NaiveDate {
    let back = match date.weekday() {
        Weekday::Sat => 1,
        Weekday::Sun => 2,
        _ => 0,
    };
    days_before(date, back)
}

/// The trading day before `date`
pub fn previous_trading_day(date: NaiveDate) -> NaiveDate {
    trading_day_adjust(days_before(date, 1))
}

fn days_before(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(date)
}

fn weekday_from_korean(day: &str) -> Option<Weekday> {
    match day {
        "월" => Some(Weekday::Mon),
        "화" => Some(Weekday::Tue),
        "수" => Some(Weekday::Wed),
        "목" => Some(Weekday::Thu),
        "금" => Some(Weekday::Fri),
        "토" => Some(Weekday::Sat),
        "일" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Substring match that will not start inside a number ("16일 전" is not "6일 전")
fn contains_keyword(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(at, _)| {
        !text[..at]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

/// Extract a date or range from `text`
///
/// Rules, first hit wins: yesterday + day-before-yesterday range, relative
/// keyword, "last week <weekday>", explicit `YYYY-MM-DD` (also `.` or `/`).
/// Explicit dates are taken as given; malformed ones are ignored.
pub fn extract_date(text: &str, today: NaiveDate) -> Option<DateSpec> {
    if text.contains(YESTERDAY) && text.contains(DAY_BEFORE_YESTERDAY) {
        return Some(DateSpec::Range(DateRange {
            from: trading_day_adjust(days_before(today, 2)),
            to: trading_day_adjust(days_before(today, 1)),
        }));
    }

    if let Some((_, offset)) = RELATIVE_DAYS
        .iter()
        .find(|(kw, _)| contains_keyword(text, kw))
    {
        return Some(DateSpec::Single(trading_day_adjust(days_before(today, *offset))));
    }

    if let Some(target) = LAST_WEEK
        .captures(text)
        .and_then(|caps| weekday_from_korean(&caps[1]))
    {
        let week_ago = days_before(today, 7);
        let back = (i64::from(week_ago.weekday().num_days_from_monday())
            - i64::from(target.num_days_from_monday())
            + 7)
            % 7;
        return Some(DateSpec::Single(trading_day_adjust(days_before(
            week_ago,
            back as u64,
        ))));
    }

    EXPLICIT_DATE.captures(text).and_then(|caps| {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day).map(DateSpec::Single)
    })
}
