//! Weekend and holiday alerts delivered to a chat webhook.

use crate::models::{AvailabilityRecord, SlotStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

const HEADER: &str = "【空き状況発見！】";
const OVERFLOW_LINE: &str = "…and more";

/// Canonical form of a time range: NFKC, no whitespace, one kind of dash.
fn canonical_range(raw: &str) -> String {
    raw.nfkc()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '~' | '〜' | '～' | '−' | '–' | '—' => '-',
            c => c,
        })
        .collect()
}

/// Available slots on a weekend or holiday within the target time ranges.
///
/// An empty `time_ranges` list accepts every slot.
pub fn select_alerts<'a>(
    records: &'a [AvailabilityRecord],
    time_ranges: &[String],
) -> Vec<&'a AvailabilityRecord> {
    let wanted: Vec<String> = time_ranges.iter().map(|r| canonical_range(r)).collect();
    records
        .iter()
        .filter(|r| r.status == SlotStatus::Available)
        .filter(|r| r.calendar_date.is_some() && r.weekday_label.is_rest_day())
        .filter(|r| wanted.is_empty() || wanted.contains(&canonical_range(&r.raw_time_slot)))
        .collect()
}

/// Header, one line per slot up to `max_lines`, then an overflow marker.
pub fn compose_message(alerts: &[&AvailabilityRecord], max_lines: usize) -> Option<String> {
    if alerts.is_empty() {
        return None;
    }
    let mut lines = vec![HEADER.to_string()];
    lines.extend(alerts.iter().take(max_lines).map(|r| {
        format!(
            "{} {} {} {}",
            r.display_date(),
            r.raw_time_slot,
            r.facility_name,
            r.room_name
        )
    }));
    if alerts.len() > max_lines {
        lines.push(OVERFLOW_LINE.to_string());
    }
    Some(lines.join("\n"))
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Posts `{"text": message}` to a webhook URL.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("Failed to build webhook client")?,
            url: url.into(),
            token,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let mut request = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "text": message }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await.context("Webhook request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Webhook rejected notification ({status}): {text}");
        }
        info!(status = status.as_u16(), "Notification sent");
        Ok(())
    }
}

/// Prints messages to stdout instead of delivering them.
pub struct DryRunNotifier;

#[async_trait]
impl Notifier for DryRunNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        debug!(chars = message.chars().count(), "Dry run, printing notification");
        println!("{message}");
        Ok(())
    }
}

/// Filter, compose and send; returns how many slots were alerted.
pub async fn notify_records(
    notifier: &dyn Notifier,
    records: &[AvailabilityRecord],
    time_ranges: &[String],
    max_lines: usize,
) -> Result<usize> {
    let alerts = select_alerts(records, time_ranges);
    let Some(message) = compose_message(&alerts, max_lines) else {
        info!(records = records.len(), "No weekend or holiday openings to report");
        return Ok(0);
    };
    notifier.send(&message).await?;
    Ok(alerts.len())
}
