//! One end-to-end harvesting attempt over every requested target.
//!
//! For each (facility, room) target the search is re-run from the start
//! page, the room's calendar is opened and walked, and every snapshot is
//! parsed into records. Failures stay local to their target; only the
//! aggregate decides whether the attempt as a whole is trusted.

use crate::browser::{Browser, Query};
use crate::models::{AvailabilityRecord, SearchQuery};
use crate::scraper::context::{self, NavigationContext};
use crate::scraper::dates::Enricher;
use crate::scraper::errors::EngineError;
use crate::scraper::locator::{Locator, TargetAction, TargetDescriptor};
use crate::scraper::paginator::Paginator;
use crate::scraper::retry::Attempt;
use crate::scraper::search::SearchSetup;
use crate::scraper::table;
use crate::utils::{collapse_whitespace, fmt_duration, log_if_slow};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, info, info_span, warn};

const SLOW_TARGET_THRESHOLD: Duration = Duration::from_secs(90);

const FACILITY_TITLE_CSS: &str = ".facility-name, .facility-title";

const HEADING_CSS: &str = "h1, h2, h3";

/// Navigation settings shared by every target of an attempt.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub search: SearchSetup,
    /// Text present on a room's availability calendar page.
    pub calendar_marker: String,
    pub paginator: Paginator,
}

/// Counters describing what one attempt saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub targets: usize,
    pub targets_failed: usize,
    pub snapshots: usize,
    pub schedule_tables: usize,
    /// Records before deduplication and date filtering.
    pub extracted: usize,
    pub records: usize,
}

/// Why an attempt's result should not be trusted.
#[derive(Debug, thiserror::Error)]
pub enum AttemptFailure {
    #[error("empty result looks like a navigation failure: {0:?}")]
    Suspected(HarvestStats),
    #[error(transparent)]
    Fatal(#[from] EngineError),
}

impl AttemptFailure {
    pub fn into_engine_error(self) -> EngineError {
        match self {
            Self::Suspected(stats) => EngineError::EmptyResultSuspected {
                targets: stats.targets,
                targets_failed: stats.targets_failed,
            },
            Self::Fatal(e) => e,
        }
    }
}

/// Decide whether an attempt's outcome is usable.
///
/// An attempt that extracted nothing is never taken as "nothing available":
/// there is no signal separating a fully booked site from heuristics that
/// missed the page, so it is reported as suspected and retried. Records
/// later dropped by the date filter still count as extracted.
pub fn classify(
    records: Vec<AvailabilityRecord>,
    stats: HarvestStats,
) -> Result<Vec<AvailabilityRecord>, AttemptFailure> {
    if stats.targets > 0 && stats.targets_failed == stats.targets {
        return Err(EngineError::SiteStructureExhausted {
            targets: stats.targets,
        }
        .into());
    }
    if stats.extracted == 0 && stats.targets > 0 {
        return Err(AttemptFailure::Suspected(stats));
    }
    Ok(records)
}

/// Drop repeated slots (first occurrence wins) and records outside the date range.
///
/// Records whose date could not be parsed are kept.
pub fn finalize(records: Vec<AvailabilityRecord>, query: &SearchQuery) -> Vec<AvailabilityRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let (date, facility, room, slot) = record.dedup_key();
            seen.insert((date, facility.to_owned(), room.to_owned(), slot.to_owned()))
        })
        .filter(|record| {
            record
                .calendar_date
                .is_none_or(|date| query.date_range.contains(date))
        })
        .collect()
}

/// Harvests every target of one query; one instance serves every retry.
pub struct Harvester {
    config: EngineConfig,
    query: SearchQuery,
    enricher: Enricher,
}

impl Harvester {
    pub fn new(config: EngineConfig, query: SearchQuery, enricher: Enricher) -> Self {
        Self {
            config,
            query,
            enricher,
        }
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Run every target once and classify the aggregate.
    pub async fn harvest(
        &self,
        browser: &dyn Browser,
    ) -> Result<Vec<AvailabilityRecord>, AttemptFailure> {
        let locator = Locator::for_query(self.query.requires_facility());
        let targets = self.query.targets();
        let mut stats = HarvestStats {
            targets: targets.len(),
            ..Default::default()
        };
        if targets.is_empty() {
            warn!("Query has no room keywords; nothing to harvest");
        }

        let mut all = Vec::new();
        for (facility, room) in &targets {
            let span = info_span!("target", facility = facility.as_str(), room = room.as_str());
            let start = Instant::now();
            let result = self
                .harvest_target(browser, &locator, facility, room, &mut stats)
                .instrument(span)
                .await;
            log_if_slow(start, SLOW_TARGET_THRESHOLD, "target harvest");

            match result {
                Ok(records) => {
                    info!(
                        facility = facility.as_str(),
                        room = room.as_str(),
                        records = records.len(),
                        duration = fmt_duration(start.elapsed()),
                        "Target harvested"
                    );
                    all.extend(records);
                }
                Err(e) => {
                    stats.targets_failed += 1;
                    warn!(
                        facility = facility.as_str(),
                        room = room.as_str(),
                        error = %e,
                        "Target failed"
                    );
                }
            }
        }

        stats.extracted = all.len();
        let records = finalize(all, &self.query);
        stats.records = records.len();
        info!(
            targets = stats.targets,
            failed = stats.targets_failed,
            snapshots = stats.snapshots,
            extracted = stats.extracted,
            records = stats.records,
            "Attempt finished"
        );
        classify(records, stats)
    }

    async fn harvest_target(
        &self,
        browser: &dyn Browser,
        locator: &Locator,
        facility: &str,
        room: &str,
        stats: &mut HarvestStats,
    ) -> Result<Vec<AvailabilityRecord>, EngineError> {
        let results_ctx = self.config.search.run(browser, &self.query.keyword).await?;
        let target = locator.locate(browser, results_ctx, facility, room).await?;
        self.open(browser, &target).await?;

        let ctx = context::resolve(browser, results_ctx, &self.config.calendar_marker)
            .await?
            .context();
        let facility_name = self.facility_name(browser, ctx, &target).await?;
        debug!(facility_name = facility_name.as_str(), frame = ?ctx.frame, "Calendar opened");

        let mut records = Vec::new();
        let walk = self
            .config
            .paginator
            .paginate(browser, ctx, |snapshot| {
                let scan = table::parse(&snapshot.html);
                stats.snapshots += 1;
                stats.schedule_tables += scan.qualifying_tables;
                for slot in scan.slots {
                    let mut record = AvailabilityRecord::new(
                        slot.raw_date,
                        slot.raw_time_slot,
                        slot.status,
                        facility_name.as_str(),
                        target.room_label.as_str(),
                    );
                    self.enricher.enrich_record(&mut record);
                    records.push(record);
                }
            })
            .await;

        match walk {
            Ok(walk) => {
                debug!(steps = walk.steps, stop = ?walk.stop, mode = ?walk.mode, "Calendar walked");
                Ok(records)
            }
            Err(e) if !records.is_empty() => {
                warn!(error = %e, kept = records.len(), "Pagination interrupted; keeping partial records");
                Ok(records)
            }
            Err(e) => Err(e),
        }
    }

    async fn open(&self, browser: &dyn Browser, target: &TargetDescriptor) -> Result<(), EngineError> {
        match &target.action {
            TargetAction::Url(url) => browser.navigate(url).await?,
            TargetAction::Element(control) => browser.click(control).await?,
        }
        Ok(())
    }

    /// Facility title on the calendar page, falling back to the search seed.
    async fn facility_name(
        &self,
        browser: &dyn Browser,
        ctx: NavigationContext,
        target: &TargetDescriptor,
    ) -> Result<String, EngineError> {
        let seed = target.facility_label.as_str();
        let mut queries = vec![Query::css(FACILITY_TITLE_CSS)];
        if seed.is_empty() {
            queries.push(Query::css(HEADING_CSS));
        } else {
            queries.push(Query::css(HEADING_CSS).containing(seed));
        }

        for query in &queries {
            for el in browser.find(ctx.frame, query).await? {
                let text = collapse_whitespace(&browser.text(&el).await?);
                if !text.is_empty() {
                    return Ok(text);
                }
            }
        }
        Ok(if seed.is_empty() {
            "不明な施設".to_string()
        } else {
            seed.to_string()
        })
    }
}

#[async_trait]
impl Attempt for Harvester {
    async fn run(&self, browser: &dyn Browser) -> Result<Vec<AvailabilityRecord>, AttemptFailure> {
        self.harvest(browser).await
    }
}
