//! Configuration module for the facility-scout application.
//!
//! Values are merged from built-in defaults, an optional TOML file and raw
//! environment variables (highest priority). Durations accept human strings
//! such as `15s` or `2m`, or a plain number of seconds.

use crate::browser::chrome::ChromeOptions;
use crate::models::{DateRange, SearchQuery};
use crate::scraper::EngineConfig;
use crate::scraper::dates::DEFAULT_LOOKBACK_DAYS;
use crate::scraper::holidays::HolidayCalendar;
use crate::scraper::paginator::Paginator;
use crate::scraper::search::SearchSetup;
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use fundu::DurationParser;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DURATION_PARSER: DurationParser<'static> = DurationParser::with_all_time_units();

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Log level for this crate's own events; `RUST_LOG` overrides it entirely.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_target_url")]
    pub target_url: String,
    #[serde(default = "default_keyword")]
    pub keyword: String,
    #[serde(default, deserialize_with = "deserialize_list")]
    pub facility_filters: Vec<String>,
    #[serde(default = "default_room_keywords", deserialize_with = "deserialize_list")]
    pub room_keywords: Vec<String>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,

    /// Snapshots per calendar in week/month paging mode.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Snapshots per calendar in month-grid mode, where every day costs a step.
    #[serde(default = "default_max_grid_steps")]
    pub max_grid_steps: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay", deserialize_with = "deserialize_duration")]
    pub retry_delay: Duration,
    #[serde(default = "default_wait_timeout", deserialize_with = "deserialize_duration")]
    pub wait_timeout: Duration,
    #[serde(default = "default_poll_interval", deserialize_with = "deserialize_duration")]
    pub poll_interval: Duration,
    /// Pause after every click or navigation so scripted re-renders can finish.
    #[serde(default = "default_settle_delay", deserialize_with = "deserialize_duration")]
    pub settle_delay: Duration,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    #[serde(default = "default_search_marker")]
    pub search_marker: String,
    #[serde(default = "default_results_marker")]
    pub results_marker: String,
    #[serde(default = "default_calendar_marker")]
    pub calendar_marker: String,
    /// Facility closure days treated like public holidays.
    #[serde(default, deserialize_with = "deserialize_list")]
    pub extra_holidays: Vec<NaiveDate>,

    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_token: Option<String>,
    #[serde(default = "default_notify_max_lines")]
    pub notify_max_lines: usize,
    #[serde(default = "default_notify_time_ranges", deserialize_with = "deserialize_list")]
    pub notify_time_ranges: Vec<String>,
    #[serde(default = "default_watch_interval", deserialize_with = "deserialize_duration")]
    pub watch_interval: Duration,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_target_url() -> String {
    "https://fujisawacity.service-now.com/facilities_reservation".to_string()
}

fn default_keyword() -> String {
    "バレーボール".to_string()
}

fn default_room_keywords() -> Vec<String> {
    vec!["体育室".to_string(), "アリーナ".to_string()]
}

fn default_max_steps() -> usize {
    12
}

fn default_max_grid_steps() -> usize {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_wait_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_lookback_days() -> i64 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_timezone() -> Tz {
    chrono_tz::Asia::Tokyo
}

fn default_search_marker() -> String {
    "検索".to_string()
}

fn default_results_marker() -> String {
    "検索結果".to_string()
}

fn default_calendar_marker() -> String {
    "空き状況".to_string()
}

fn default_true() -> bool {
    true
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_notify_max_lines() -> usize {
    10
}

fn default_notify_time_ranges() -> Vec<String> {
    [
        "09:00-11:00",
        "11:00-13:00",
        "13:00-15:00",
        "15:00-17:00",
        "17:00-19:00",
        "19:00-21:00",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_watch_interval() -> Duration {
    Duration::from_secs(30 * 60)
}

/// Duration from a fundu string (`"15s"`, `"1.5m"`) or a number of seconds.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a duration string like \"15s\" or a number of seconds")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            let parsed = DURATION_PARSER
                .parse(value.trim())
                .map_err(|e| E::custom(format!("invalid duration {value:?}: {e}")))?;
            Duration::try_from(parsed)
                .map_err(|e| E::custom(format!("duration {value:?} out of range: {e}")))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
            u64::try_from(value)
                .map(Duration::from_secs)
                .map_err(|_| E::custom(format!("negative duration: {value}")))
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Duration, E> {
            Duration::try_from_secs_f64(value)
                .map_err(|e| E::custom(format!("invalid duration {value}: {e}")))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(String),
}

/// List from a TOML array or a comma-separated string (as environment variables give).
fn deserialize_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match OneOrMany::<T>::deserialize(deserializer)? {
        OneOrMany::Many(items) => Ok(items),
        OneOrMany::One(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                item.parse::<T>()
                    .map_err(|e| serde::de::Error::custom(format!("invalid item {item:?}: {e}")))
            })
            .collect(),
    }
}

impl Config {
    /// Merge defaults, an optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::figment(path)
            .extract()
            .context("Failed to load config")
    }

    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file_exact(path));
        }
        figment.merge(Env::raw().only(&Self::KEYS))
    }

    /// Keys read from the environment; anything else in it is ignored.
    pub const KEYS: [&'static str; 30] = [
        "log_level",
        "target_url",
        "keyword",
        "facility_filters",
        "room_keywords",
        "date_from",
        "date_to",
        "max_steps",
        "max_grid_steps",
        "max_retries",
        "retry_delay",
        "wait_timeout",
        "poll_interval",
        "settle_delay",
        "lookback_days",
        "timezone",
        "search_marker",
        "results_marker",
        "calendar_marker",
        "extra_holidays",
        "headless",
        "chrome_path",
        "window_width",
        "window_height",
        "user_agent",
        "webhook_url",
        "webhook_token",
        "notify_max_lines",
        "notify_time_ranges",
        "watch_interval",
    ];

    /// Today's date in the configured timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    pub fn holidays(&self) -> HolidayCalendar {
        HolidayCalendar::new().with_extra_days(self.extra_holidays.iter().copied())
    }

    pub fn search_query(&self) -> SearchQuery {
        SearchQuery {
            keyword: self.keyword.clone(),
            facility_filters: self.facility_filters.clone(),
            room_keywords: self.room_keywords.clone(),
            date_range: DateRange::new(self.date_from, self.date_to),
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            search: SearchSetup {
                target_url: self.target_url.clone(),
                search_marker: self.search_marker.clone(),
                results_marker: self.results_marker.clone(),
                wait_timeout: self.wait_timeout,
                poll_interval: self.poll_interval,
            },
            calendar_marker: self.calendar_marker.clone(),
            paginator: Paginator {
                max_steps: self.max_steps,
                max_grid_steps: self.max_grid_steps,
                wait_timeout: self.wait_timeout,
                poll_interval: self.poll_interval,
                calendar_marker: self.calendar_marker.clone(),
            },
        }
    }

    pub fn chrome(&self) -> ChromeOptions {
        ChromeOptions {
            headless: self.headless,
            chrome_path: self.chrome_path.clone(),
            window_size: (self.window_width, self.window_height),
            user_agent: self.user_agent.clone(),
            settle_delay: self.settle_delay,
            navigation_timeout: self.wait_timeout,
        }
    }
}
