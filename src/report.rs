//! Filtering, ordering and rendering of harvested records for the terminal.

use crate::models::{AvailabilityRecord, DateRange, SlotStatus, TimeBucket, WeekdayLabel};
use chrono::Datelike;
use std::cmp::Ordering;
use yansi::Paint;

/// Presentation-side filters; empty lists accept everything.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub date_range: DateRange,
    pub weekdays: Vec<WeekdayLabel>,
    pub buckets: Vec<TimeBucket>,
    /// Facility name substrings.
    pub facilities: Vec<String>,
}

impl ReportFilter {
    pub fn accepts(&self, record: &AvailabilityRecord) -> bool {
        let in_range = record
            .calendar_date
            .is_none_or(|d| self.date_range.contains(d));
        let weekday_ok = self.weekdays.is_empty()
            || self.weekdays.contains(&record.weekday_label)
            // Holidays also satisfy a filter on the weekday they fall on.
            || record
                .calendar_date
                .is_some_and(|d| self.weekdays.contains(&WeekdayLabel::from_weekday(d.weekday())));
        let bucket_ok = self.buckets.is_empty() || self.buckets.contains(&record.time_bucket);
        let facility_ok = self.facilities.is_empty()
            || self
                .facilities
                .iter()
                .any(|f| record.facility_name.contains(f.as_str()));
        in_range && weekday_ok && bucket_ok && facility_ok
    }

    /// Matching records ordered by date, facility, room and slot; undated ones last.
    pub fn apply<'a>(&self, records: &'a [AvailabilityRecord]) -> Vec<&'a AvailabilityRecord> {
        let mut out: Vec<_> = records.iter().filter(|r| self.accepts(r)).collect();
        out.sort_by(|a, b| compare(a, b));
        out
    }
}

fn compare(a: &AvailabilityRecord, b: &AvailabilityRecord) -> Ordering {
    let by_date = match (a.calendar_date, b.calendar_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.raw_date.cmp(&b.raw_date),
    };
    by_date
        .then_with(|| a.facility_name.cmp(&b.facility_name))
        .then_with(|| a.room_name.cmp(&b.room_name))
        .then_with(|| a.raw_time_slot.cmp(&b.raw_time_slot))
}

/// Terminal columns taken by `s`; East Asian wide characters count double.
fn display_width(s: &str) -> usize {
    s.chars()
        .map(|c| match c as u32 {
            0x1100..=0x115F | 0x2E80..=0xA4CF | 0xAC00..=0xD7A3 | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F | 0xFF00..=0xFF60 | 0xFFE0..=0xFFE6 => 2,
            _ => 1,
        })
        .sum()
}

fn pad(s: &str, width: usize) -> String {
    let fill = width.saturating_sub(display_width(s));
    format!("{s}{}", " ".repeat(fill))
}

const HEADERS: [&str; 5] = ["日付", "時間", "施設", "室場", "状況"];

/// Fixed-width text table; `color` paints the status column.
pub fn render_table(records: &[&AvailabilityRecord], color: bool) -> String {
    if records.is_empty() {
        return "該当する空きはありません".to_string();
    }

    let rows: Vec<[String; 4]> = records
        .iter()
        .map(|r| {
            [
                r.display_date(),
                r.raw_time_slot.clone(),
                r.facility_name.clone(),
                r.room_name.clone(),
            ]
        })
        .collect();

    let mut widths = [0usize; 4];
    for (i, header) in HEADERS.iter().take(4).enumerate() {
        widths[i] = rows
            .iter()
            .map(|row| display_width(&row[i]))
            .max()
            .unwrap_or(0)
            .max(display_width(header));
    }

    let mut out = String::new();
    let header: Vec<String> = HEADERS
        .iter()
        .take(4)
        .zip(widths)
        .map(|(h, w)| pad(h, w))
        .collect();
    out.push_str(&format!("{}  {}\n", header.join("  "), HEADERS[4]));

    for (row, record) in rows.iter().zip(records) {
        let cells: Vec<String> = row.iter().zip(widths).map(|(c, w)| pad(c, w)).collect();
        let status = record.status.glyph();
        let status = match (color, record.status) {
            (false, _) => status.to_string(),
            (true, SlotStatus::Available) => status.green().bold().to_string(),
            (true, SlotStatus::Limited) => status.yellow().to_string(),
        };
        out.push_str(&format!("{}  {}\n", cells.join("  "), status));
    }
    out.push_str(&format!("{} 件", records.len()));
    out
}

pub fn render_json(records: &[&AvailabilityRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}
