//! Bounded retries over whole harvesting attempts.
//!
//! Every attempt gets a freshly launched browser session, and that session
//! is closed before anything else happens, whatever the attempt returned.

use crate::browser::{Browser, BrowserLauncher};
use crate::models::AvailabilityRecord;
use crate::scraper::errors::EngineError;
use crate::scraper::harvest::AttemptFailure;
use crate::utils::fmt_duration;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// One unit of work run against a fresh browser session.
#[async_trait]
pub trait Attempt: Send + Sync {
    async fn run(&self, browser: &dyn Browser) -> Result<Vec<AvailabilityRecord>, AttemptFailure>;
}

/// Result of a retried run; `records` is empty when every attempt failed.
#[derive(Debug)]
pub struct RunOutcome {
    pub records: Vec<AvailabilityRecord>,
    pub attempts: u32,
    pub last_error: Option<EngineError>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.last_error.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryController {
    /// Total number of attempts, including the first.
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryController {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub async fn run<L: BrowserLauncher>(&self, launcher: &L, attempt: &dyn Attempt) -> RunOutcome {
        let max_attempts = self.max_retries.max(1);
        let mut last_error = None;

        for number in 1..=max_attempts {
            let start = Instant::now();
            let failure = match self.attempt_once(launcher, attempt).await {
                Ok(records) => {
                    info!(
                        attempt = number,
                        records = records.len(),
                        duration = fmt_duration(start.elapsed()),
                        "Attempt succeeded"
                    );
                    return RunOutcome {
                        records,
                        attempts: number,
                        last_error: None,
                    };
                }
                Err(failure) => failure,
            };

            let error = failure.into_engine_error();
            if number < max_attempts {
                warn!(
                    attempt = number,
                    max_attempts,
                    error = %error,
                    retry_in = fmt_duration(self.delay),
                    "Attempt failed, retrying"
                );
                last_error = Some(error);
                tokio::time::sleep(self.delay).await;
            } else {
                error!(attempt = number, error = %error, "Attempt failed, giving up");
                last_error = Some(error);
            }
        }

        RunOutcome {
            records: Vec::new(),
            attempts: max_attempts,
            last_error,
        }
    }

    async fn attempt_once<L: BrowserLauncher>(
        &self,
        launcher: &L,
        attempt: &dyn Attempt,
    ) -> Result<Vec<AvailabilityRecord>, AttemptFailure> {
        let session = launcher
            .launch()
            .await
            .map_err(|e| AttemptFailure::Fatal(EngineError::Launch(e)))?;
        let result = attempt.run(&session).await;
        session.close().await;
        result
    }
}
