// =============================================================================
// fetcher.rs — ONE POLITE REQUEST PER MARKET
// =============================================================================
//
// MOPS exposes last week's announcements through the same AJAX endpoint its
// own search page uses: a form POST with the date range (in ROC years) and a
// market code. We send exactly four of them, one after another, with a
// random pause in between. MOPS is quick to block an IP that fires requests
// back to back, and a blocked run produces a report full of nothing.
//
// Nothing in here ever fails the run. Every segment ends in a
// [`SegmentOutcome`], good or bad, and the next segment gets its turn.
// =============================================================================

use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::date_window::DateWindow;
use crate::models::{MarketSegment, SegmentOutcome, SegmentReport};
use crate::table_extractor::{self, ExtractError};

/// MOPS renders this instead of a table when nothing was announced.
pub const NO_DATA_SENTINEL: &str = "查無資料";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(StatusCode),
}

// =============================================================================
// Pacing
// =============================================================================

/// Supplies the pause taken between two segment requests.
pub trait DelayProvider {
    fn next_delay(&mut self) -> Duration;
}

/// Uniformly random pause within `[min, max]`, millisecond resolution.
#[derive(Debug, Clone)]
pub struct RandomDelay {
    min_ms: u64,
    max_ms: u64,
}

impl RandomDelay {
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_ms = min.as_millis() as u64;
        let max_ms = (max.as_millis() as u64).max(min_ms);
        Self { min_ms, max_ms }
    }
}

impl DelayProvider for RandomDelay {
    fn next_delay(&mut self) -> Duration {
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }
}

/// Always the same pause. `FixedDelay::zero()` keeps tests from sleeping.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    pub fn zero() -> Self {
        FixedDelay(Duration::ZERO)
    }
}

impl DelayProvider for FixedDelay {
    fn next_delay(&mut self) -> Duration {
        self.0
    }
}

// =============================================================================
// The query form
// =============================================================================

/// The form the MOPS announcement search page submits. Field names and the
/// constant values are what the site expects; only the dates and `typek`
/// change between requests.
#[derive(Debug, Serialize)]
struct AnnouncementQuery {
    #[serde(rename = "encodeURIComponent")]
    encode_uri_component: &'static str,
    step: &'static str,
    firstin: &'static str,
    off: &'static str,
    year: String,
    month: String,
    day: String,
    year2: String,
    month2: String,
    day2: String,
    typek: &'static str,
    co_id: &'static str,
    spoke_time: &'static str,
}

impl AnnouncementQuery {
    fn new(window: &DateWindow, segment: MarketSegment) -> Self {
        Self {
            encode_uri_component: "1",
            step: "1",
            firstin: "1",
            off: "1",
            year: window.start_roc.year.to_string(),
            month: window.start_roc.month.to_string(),
            day: window.start_roc.day.to_string(),
            year2: window.end_roc.year.to_string(),
            month2: window.end_roc.month.to_string(),
            day2: window.end_roc.day.to_string(),
            typek: segment.code(),
            co_id: "",
            spoke_time: "1",
        }
    }
}

// =============================================================================
// The fetcher
// =============================================================================

pub struct MarketFetcher {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl MarketFetcher {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            endpoint: config.endpoint_url.clone(),
        })
    }

    /// Query every segment in order, pausing between requests.
    ///
    /// Always returns one report per segment, in [`MarketSegment::ALL`] order.
    pub async fn fetch_all(
        &self,
        window: &DateWindow,
        delay: &mut dyn DelayProvider,
    ) -> Vec<SegmentReport> {
        let mut reports = Vec::with_capacity(MarketSegment::ALL.len());

        for (i, segment) in MarketSegment::ALL.into_iter().enumerate() {
            if i > 0 {
                let pause = delay.next_delay();
                debug!(pause_ms = pause.as_millis() as u64, "Pausing before next segment");
                tokio::time::sleep(pause).await;
            }

            info!(segment = %segment, "🔎 Scanning segment");
            let outcome = self.fetch_segment(window, segment).await;
            log_outcome(segment, &outcome);
            debug!(segment = %segment, outcome = outcome.kind(), "Segment done");
            reports.push(SegmentReport::new(segment, outcome));
        }

        reports
    }

    /// One request, one outcome. Transport failures are caught here.
    pub async fn fetch_segment(&self, window: &DateWindow, segment: MarketSegment) -> SegmentOutcome {
        match self.post_query(window, segment).await {
            Ok(body) => classify_response(&body),
            Err(e) => SegmentOutcome::TransportError(e.to_string()),
        }
    }

    async fn post_query(&self, window: &DateWindow, segment: MarketSegment) -> Result<String, FetchError> {
        let query = AnnouncementQuery::new(window, segment);

        let response = self
            .client
            .post(self.endpoint.clone())
            .form(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        // MOPS mislabels its charset often enough that we ignore the header
        // and decode as UTF-8.
        let bytes = response.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Decide what a response body means.
pub fn classify_response(body: &str) -> SegmentOutcome {
    if memchr::memmem::find(body.as_bytes(), NO_DATA_SENTINEL.as_bytes()).is_some() {
        return SegmentOutcome::NoData;
    }

    match table_extractor::extract_announcements(body) {
        Ok(Some(table)) => SegmentOutcome::Success(table),
        Ok(None) => SegmentOutcome::TableNotFound,
        Err(ExtractError::NoTables) => SegmentOutcome::ParseFailure,
    }
}

fn log_outcome(segment: MarketSegment, outcome: &SegmentOutcome) {
    match outcome {
        SegmentOutcome::Success(table) => {
            info!(segment = %segment, rows = table.len(), "✅ Announcement table retrieved");
        }
        SegmentOutcome::NoData => {
            info!(segment = %segment, "📭 MOPS reports no announcements");
        }
        SegmentOutcome::ParseFailure => {
            warn!(segment = %segment, "⚠️ Response has no readable table (blocked IP or layout change?)");
        }
        SegmentOutcome::TableNotFound => {
            warn!(segment = %segment, "⚠️ Response has tables but no announcement list");
        }
        SegmentOutcome::TransportError(message) => {
            warn!(segment = %segment, error = %message, "❌ Request failed");
        }
    }
}
