//! Date, weekday and time-bucket enrichment for raw schedule labels.
//!
//! The site prints dates in several shapes (`3/15(土)`, `2024年3月15日`,
//! `３／１５（土）`, `2024-03-15`) and usually omits the year. Labels are
//! NFKC-normalized before parsing so full-width digits and brackets behave
//! like their ASCII forms.

use crate::models::{AvailabilityRecord, TimeBucket, WeekdayLabel};
use crate::scraper::holidays::HolidayCalendar;
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Default year-rollover threshold for month/day labels.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 60;

static TRAILING_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^()]*\)\s*$").unwrap());

static WEEKDAY_GLYPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*([^\s()]{1,3})\s*\)").unwrap());

static LEADING_HOUR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\D*?(\d{1,2})\s*[:時]").unwrap());

/// Ordered keyword sets for time buckets; checked before the clock hour.
const BUCKET_KEYWORDS: &[(&str, TimeBucket)] = &[
    ("午前", TimeBucket::Morning),
    ("午後", TimeBucket::Afternoon),
    ("夜間", TimeBucket::Evening),
    ("夜", TimeBucket::Evening),
    ("morning", TimeBucket::Morning),
    ("afternoon", TimeBucket::Afternoon),
    ("evening", TimeBucket::Evening),
    ("night", TimeBucket::Evening),
];

/// Derives calendar fields from raw date and time-slot labels.
#[derive(Debug)]
pub struct Enricher {
    today: NaiveDate,
    lookback: Duration,
    holidays: HolidayCalendar,
}

impl Enricher {
    pub fn new(today: NaiveDate, lookback_days: i64, holidays: HolidayCalendar) -> Self {
        Self {
            today,
            lookback: Duration::days(lookback_days),
            holidays,
        }
    }

    /// Parse a raw date label and derive its weekday label.
    pub fn enrich(&self, raw_date: &str) -> (Option<NaiveDate>, WeekdayLabel) {
        let normalized: String = raw_date.nfkc().collect();
        match self.parse_date(&normalized) {
            Some(date) => (Some(date), self.weekday_label(date)),
            None => (None, weekday_from_glyph(&normalized)),
        }
    }

    /// Fill the derived fields of a freshly extracted record.
    pub fn enrich_record(&self, record: &mut AvailabilityRecord) {
        let (date, label) = self.enrich(&record.raw_date);
        record.calendar_date = date;
        record.weekday_label = label;
        record.time_bucket = time_bucket(&record.raw_time_slot);
    }

    pub fn weekday_label(&self, date: NaiveDate) -> WeekdayLabel {
        if self.holidays.is_holiday(date) {
            WeekdayLabel::Holiday
        } else {
            WeekdayLabel::from_weekday(date.weekday())
        }
    }

    fn parse_date(&self, normalized: &str) -> Option<NaiveDate> {
        let parts = split_components(normalized)?;
        match parts.as_slice() {
            [a, b, c] if a.len() == 4 => ymd(a, b, c),
            [a, b, c] if c.len() == 4 => ymd(c, a, b),
            [month, day] => self.infer_year(month.parse().ok()?, day.parse().ok()?),
            _ => None,
        }
    }

    /// Month/day in the current year, or the next one when that lands too far in the past.
    fn infer_year(&self, month: u32, day: u32) -> Option<NaiveDate> {
        let year = self.today.year();
        // Feb 29 may only exist in the following year
        let this_year = NaiveDate::from_ymd_opt(year, month, day);
        match this_year {
            Some(date) if date >= self.today - self.lookback => Some(date),
            _ => NaiveDate::from_ymd_opt(year + 1, month, day)
                .filter(|_| this_year.is_some() || (month == 2 && day == 29)),
        }
    }
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Split a normalized label into its numeric components.
///
/// Returns `None` unless there are two or three all-digit components.
fn split_components(normalized: &str) -> Option<Vec<String>> {
    let stripped = TRAILING_PAREN_RE.replace(normalized.trim(), "");
    let unified: String = stripped
        .chars()
        .map(|c| match c {
            '年' | '月' | '-' | '.' | '/' => '/',
            '日' => ' ',
            c => c,
        })
        .collect();

    let parts: Vec<String> = unified
        .split('/')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    let all_numeric = parts
        .iter()
        .all(|p| p.len() <= 4 && p.chars().all(|c| c.is_ascii_digit()));
    if !all_numeric || !(2..=3).contains(&parts.len()) {
        return None;
    }
    Some(parts)
}

/// Weekday from a parenthetical glyph such as `(土)` or `(Sat)`.
fn weekday_from_glyph(normalized: &str) -> WeekdayLabel {
    WEEKDAY_GLYPH_RE
        .captures_iter(normalized)
        .find_map(|caps| WeekdayLabel::from_glyph(&caps[1]))
        .unwrap_or(WeekdayLabel::Unknown)
}

/// Classify a raw time-slot label into a coarse part of day.
pub fn time_bucket(raw_time_slot: &str) -> TimeBucket {
    let normalized: String = raw_time_slot.nfkc().collect::<String>().to_lowercase();

    if let Some(&(_, bucket)) = BUCKET_KEYWORDS
        .iter()
        .find(|(keyword, _)| normalized.contains(keyword))
    {
        return bucket;
    }

    let hour = LEADING_HOUR_RE
        .captures(&normalized)
        .and_then(|caps| caps[1].parse::<u32>().ok());
    match hour {
        Some(h) if h < 12 => TimeBucket::Morning,
        Some(h) if h < 17 => TimeBucket::Afternoon,
        Some(h) if h < 24 => TimeBucket::Evening,
        _ => TimeBucket::Other,
    }
}
