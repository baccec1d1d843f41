//! Schedule feed fetching.
//!
//! [`WeekFetcher`] is the retrieval boundary: the orchestrator only ever
//! sees parsed [`ShiftDay`] rows, never transport details.
//! [`HttpWeekFetcher`] is the shipped implementation, a client for the JSON
//! schedule feed.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::error::{Result, ScheduleError};
use crate::week::ShiftDay;

/// One fetched schedule period.
#[derive(Debug, Clone)]
pub struct FetchedPeriod {
    /// Parsed day rows, ISO-dated, undated rows already dropped.
    pub days: Vec<ShiftDay>,
    /// URL the period was fetched from.
    pub source_url: String,
    /// Raw upstream row count, before date filtering.
    pub row_count: usize,
}

/// Retrieval boundary for schedule periods.
#[async_trait]
pub trait WeekFetcher: Send + Sync {
    /// Fetch the schedule period containing `anchor`.
    ///
    /// `persist` asks the implementation to durably record the period's raw
    /// artifact; implementations without persistence ignore it.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Fetch`] when the period cannot be retrieved
    /// or decoded.
    async fn fetch_period(&self, anchor: NaiveDate, persist: bool) -> Result<FetchedPeriod>;
}

/// A row of the upstream JSON feed. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct FeedRow {
    /// Date in unpadded `M/d/yyyy` form, as published upstream.
    #[serde(default)]
    date: String,
    /// Shift text.
    #[serde(default)]
    desc: String,
}

/// JSON schedule feed client.
pub struct HttpWeekFetcher {
    client: reqwest::Client,
    base_url: String,
    employee: String,
    persist_dir: Option<PathBuf>,
}

impl HttpWeekFetcher {
    /// Build a fetcher from the fetch section of the agent config.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Fetch`] if the HTTP client cannot be built.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ScheduleError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            employee: config.employee.clone(),
            persist_dir: config.persist_dir.clone(),
        })
    }

    /// Feed URL for the period containing `anchor`, query values encoded.
    fn period_url(&self, anchor: NaiveDate) -> String {
        let date = format!("{}/{}/{}", anchor.month(), anchor.day(), anchor.year());
        format!(
            "{}?NameSelected={}&DateValue={}",
            self.base_url,
            urlencoding::encode(&self.employee),
            urlencoding::encode(&date),
        )
    }

    /// Write the raw feed body as a dated snapshot, best effort.
    fn persist_raw(&self, anchor: NaiveDate, body: &str) {
        let Some(dir) = &self.persist_dir else { return };
        let path = dir.join(format!("period-{anchor}.json"));
        if let Err(e) = std::fs::create_dir_all(dir).and_then(|()| std::fs::write(&path, body)) {
            warn!(path = %path.display(), error = %e, "failed to persist feed snapshot");
        }
    }
}

#[async_trait]
impl WeekFetcher for HttpWeekFetcher {
    async fn fetch_period(&self, anchor: NaiveDate, persist: bool) -> Result<FetchedPeriod> {
        let url = self.period_url(anchor);
        debug!(%url, "fetching schedule period");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ScheduleError::Fetch(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScheduleError::Fetch(format!("{url} returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScheduleError::Fetch(format!("failed to read body from {url}: {e}")))?;

        let rows: Vec<FeedRow> = serde_json::from_str(&body)
            .map_err(|e| ScheduleError::Fetch(format!("invalid feed body from {url}: {e}")))?;

        if persist {
            self.persist_raw(anchor, &body);
        }

        let days: Vec<ShiftDay> = rows.iter().filter_map(row_to_day).collect();
        debug!(rows = rows.len(), days = days.len(), "parsed schedule period");

        Ok(FetchedPeriod {
            days,
            source_url: url,
            row_count: rows.len(),
        })
    }
}

/// Convert one feed row; rows without a parseable date are dropped.
fn row_to_day(row: &FeedRow) -> Option<ShiftDay> {
    let date = NaiveDate::parse_from_str(row.date.trim(), "%m/%d/%Y").ok()?;
    let label = row.desc.trim();
    Some(ShiftDay {
        date: date.format("%Y-%m-%d").to_string(),
        weekday: date.format("%a").to_string(),
        label: label.to_owned(),
        is_off: is_off_label(label),
    })
}

/// Whether the shift text contains the word `OFF` on token boundaries.
fn is_off_label(label: &str) -> bool {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token.eq_ignore_ascii_case("off"))
}
