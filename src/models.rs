//! Records and inputs shared between the navigation engine and its consumers.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bookable state of one schedule cell.
///
/// Full/closed cells never become records, so there is no variant for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Limited,
}

impl SlotStatus {
    /// The glyph the reservation site itself uses for this state.
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Available => "○",
            Self::Limited => "△",
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glyph())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeekdayLabel {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
    Holiday,
    Unknown,
}

impl WeekdayLabel {
    pub fn from_weekday(day: Weekday) -> Self {
        match day {
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
            Weekday::Sun => Self::Sun,
        }
    }

    /// Parse a weekday glyph as printed by the site (`土`, `祝`) or an English abbreviation.
    pub fn from_glyph(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "月" | "mon" => Some(Self::Mon),
            "火" | "tue" => Some(Self::Tue),
            "水" | "wed" => Some(Self::Wed),
            "木" | "thu" => Some(Self::Thu),
            "金" | "fri" => Some(Self::Fri),
            "土" | "sat" => Some(Self::Sat),
            "日" | "sun" => Some(Self::Sun),
            "祝" | "祭" | "hol" | "holiday" => Some(Self::Holiday),
            _ => None,
        }
    }

    /// Saturdays, Sundays and public holidays.
    pub fn is_rest_day(self) -> bool {
        matches!(self, Self::Sat | Self::Sun | Self::Holiday)
    }
}

impl fmt::Display for WeekdayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeBucket {
    Morning,
    Afternoon,
    Evening,
    Other,
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One bookable (or nearly bookable) slot extracted from a schedule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub raw_date: String,
    pub calendar_date: Option<NaiveDate>,
    pub weekday_label: WeekdayLabel,
    pub facility_name: String,
    pub room_name: String,
    pub raw_time_slot: String,
    pub time_bucket: TimeBucket,
    pub status: SlotStatus,
}

impl AvailabilityRecord {
    /// Build an un-enriched record; date and bucket fields are filled by
    /// [`crate::scraper::dates::Enricher::enrich_record`].
    pub fn new(
        raw_date: impl Into<String>,
        raw_time_slot: impl Into<String>,
        status: SlotStatus,
        facility_name: impl Into<String>,
        room_name: impl Into<String>,
    ) -> Self {
        Self {
            raw_date: raw_date.into(),
            calendar_date: None,
            weekday_label: WeekdayLabel::Unknown,
            facility_name: facility_name.into(),
            room_name: room_name.into(),
            raw_time_slot: raw_time_slot.into(),
            time_bucket: TimeBucket::Other,
            status,
        }
    }

    /// Identity used when merging snapshots that captured the same slot twice.
    pub fn dedup_key(&self) -> (String, &str, &str, &str) {
        let date = match self.calendar_date {
            Some(d) => d.format("%Y-%m-%d").to_string(),
            None => self.raw_date.clone(),
        };
        (
            date,
            self.facility_name.as_str(),
            self.room_name.as_str(),
            self.raw_time_slot.as_str(),
        )
    }

    /// Human-facing date: ISO date with weekday when parsed, raw text otherwise.
    pub fn display_date(&self) -> String {
        match self.calendar_date {
            Some(d) => format!(
                "{:04}-{:02}-{:02} ({})",
                d.year(),
                d.month(),
                d.day(),
                self.weekday_label
            ),
            None => self.raw_date.clone(),
        }
    }
}

/// Inclusive date window; either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

/// What the caller wants harvested.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub keyword: String,
    /// Short prefixes of facility names; empty means "any facility".
    pub facility_filters: Vec<String>,
    /// Room categories to open inside each facility.
    pub room_keywords: Vec<String>,
    pub date_range: DateRange,
}

impl SearchQuery {
    /// Facility-seed × room-keyword pairs, in query order.
    ///
    /// With no facility filters a single empty seed is produced, which the
    /// locator treats as "facility identity not required".
    pub fn targets(&self) -> Vec<(String, String)> {
        let seeds: Vec<String> = if self.facility_filters.is_empty() {
            vec![String::new()]
        } else {
            self.facility_filters.clone()
        };
        seeds
            .iter()
            .flat_map(|seed| {
                self.room_keywords
                    .iter()
                    .map(move |room| (seed.clone(), room.clone()))
            })
            .collect()
    }

    pub fn requires_facility(&self) -> bool {
        !self.facility_filters.is_empty()
    }
}
