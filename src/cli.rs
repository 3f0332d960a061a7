use crate::models::{TimeBucket, WeekdayLabel};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Facility availability scout for the Fujisawa city reservation site
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML configuration file, merged under environment variables
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format(), global = true)]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest availability once and print a report
    Fetch(FetchArgs),
    /// Harvest once and send weekend/holiday openings to the webhook
    Notify {
        /// Print the message instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// Harvest and notify repeatedly until interrupted
    Watch {
        /// Time between runs (e.g. "30m"); defaults to `watch_interval`
        #[arg(long, value_parser = parse_duration)]
        interval: Option<Duration>,
        /// Print messages instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct FetchArgs {
    /// Search keyword (overrides `keyword`)
    #[arg(long)]
    pub keyword: Option<String>,

    /// Facility name prefix; repeatable (overrides `facility_filters`)
    #[arg(long = "facility")]
    pub facilities: Vec<String>,

    /// Room category; repeatable (overrides `room_keywords`)
    #[arg(long = "room")]
    pub rooms: Vec<String>,

    /// First date to report (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last date to report (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Only report these weekday labels; repeatable
    #[arg(long, value_parser = parse_weekday)]
    pub weekday: Vec<WeekdayLabel>,

    /// Only report these parts of the day; repeatable
    #[arg(long, value_enum)]
    pub bucket: Vec<BucketArg>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BucketArg {
    Morning,
    Afternoon,
    Evening,
    Other,
}

impl From<BucketArg> for TimeBucket {
    fn from(arg: BucketArg) -> Self {
        match arg {
            BucketArg::Morning => TimeBucket::Morning,
            BucketArg::Afternoon => TimeBucket::Afternoon,
            BucketArg::Evening => TimeBucket::Evening,
            BucketArg::Other => TimeBucket::Other,
        }
    }
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}

fn parse_weekday(s: &str) -> Result<WeekdayLabel, String> {
    WeekdayLabel::from_glyph(s).ok_or_else(|| format!("unknown weekday label: {s}"))
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let parsed = fundu::DurationParser::with_all_time_units()
        .parse(s)
        .map_err(|e| e.to_string())?;
    Duration::try_from(parsed).map_err(|e| e.to_string())
}
