use crate::browser::chrome::ChromeLauncher;
use crate::cli::{FetchArgs, OutputFormat};
use crate::config::Config;
use crate::models::{DateRange, SearchQuery};
use crate::notify::{self, DryRunNotifier, Notifier, WebhookNotifier};
use crate::report::{self, ReportFilter};
use crate::scraper::dates::Enricher;
use crate::scraper::{Harvester, RetryController, RunOutcome};
use crate::utils::fmt_duration;
use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Wires configuration into the engine and the output surfaces.
pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the engine with retries; the browser is gone when this returns.
    async fn harvest(&self, query: SearchQuery) -> RunOutcome {
        let enricher = Enricher::new(
            self.config.today(),
            self.config.lookback_days,
            self.config.holidays(),
        );
        let harvester = Harvester::new(self.config.engine(), query, enricher);
        let launcher = ChromeLauncher::new(self.config.chrome());
        let controller = RetryController::new(self.config.max_retries, self.config.retry_delay);

        let start = Instant::now();
        let outcome = controller.run(&launcher, &harvester).await;
        info!(
            keyword = harvester.query().keyword.as_str(),
            records = outcome.records.len(),
            attempts = outcome.attempts,
            duration = fmt_duration(start.elapsed()),
            "Harvest finished"
        );
        outcome
    }

    /// Harvest once and print the filtered report to stdout.
    pub async fn fetch(&self, args: FetchArgs) -> Result<()> {
        let mut query = self.config.search_query();
        if let Some(keyword) = args.keyword {
            query.keyword = keyword;
        }
        if !args.facilities.is_empty() {
            query.facility_filters = args.facilities;
        }
        if !args.rooms.is_empty() {
            query.room_keywords = args.rooms;
        }
        if args.from.is_some() || args.to.is_some() {
            query.date_range = DateRange::new(args.from, args.to);
        }
        let filter = ReportFilter {
            date_range: query.date_range,
            weekdays: args.weekday,
            buckets: args.bucket.into_iter().map(Into::into).collect(),
            facilities: Vec::new(),
        };

        let outcome = self.harvest(query).await;
        if let Some(e) = outcome.last_error {
            return Err(e).context(format!(
                "Harvest failed after {} attempts",
                outcome.attempts
            ));
        }

        let records = filter.apply(&outcome.records);
        let rendered = match args.format {
            OutputFormat::Table => report::render_table(&records, std::io::stdout().is_terminal()),
            OutputFormat::Json => {
                report::render_json(&records).context("Failed to serialize records")?
            }
        };
        println!("{rendered}");
        Ok(())
    }

    fn notifier(&self, dry_run: bool) -> Result<Box<dyn Notifier>> {
        if dry_run {
            return Ok(Box::new(DryRunNotifier));
        }
        let url = self
            .config
            .webhook_url
            .clone()
            .context("webhook_url is not configured (use --dry-run to print instead)")?;
        Ok(Box::new(WebhookNotifier::new(
            url,
            self.config.webhook_token.clone(),
        )?))
    }

    /// Harvest once and alert on weekend/holiday openings; returns the number alerted.
    pub async fn notify(&self, dry_run: bool) -> Result<usize> {
        let notifier = self.notifier(dry_run)?;
        let outcome = self.harvest(self.config.search_query()).await;
        if let Some(e) = outcome.last_error {
            return Err(e).context(format!(
                "Harvest failed after {} attempts",
                outcome.attempts
            ));
        }

        let alerted = notify::notify_records(
            notifier.as_ref(),
            &outcome.records,
            &self.config.notify_time_ranges,
            self.config.notify_max_lines,
        )
        .await?;
        info!(
            records = outcome.records.len(),
            alerted, dry_run, "Notification run complete"
        );
        Ok(alerted)
    }

    /// Repeat notification runs until Ctrl-C; a failed run does not stop the loop.
    pub async fn watch(&self, interval: Option<Duration>, dry_run: bool) -> Result<()> {
        let interval = interval.unwrap_or(self.config.watch_interval);
        // Fail fast on a missing webhook rather than after the first harvest.
        self.notifier(dry_run)?;
        info!(interval = fmt_duration(interval), dry_run, "Watch started");

        let mut runs: u64 = 0;
        loop {
            runs += 1;
            match self.notify(dry_run).await {
                Ok(alerted) => info!(run = runs, alerted, "Watch run finished"),
                Err(e) => error!(run = runs, error = ?e, "Watch run failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!(error = ?e, "Failed to listen for Ctrl-C");
                    }
                    info!(runs, "Watch stopped");
                    return Ok(());
                }
            }
        }
    }
}
