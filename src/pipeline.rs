// =============================================================================
// pipeline.rs — FETCH, MERGE, FILTER, WRITE. IN THAT ORDER. ONCE.
// =============================================================================
//
// The whole job in one function. Segment-level trouble never escapes the
// fetcher, so by the time we get here the only question is which of the four
// report shapes to write. The one thing allowed to fail the run is writing
// the file itself.
// =============================================================================

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::date_window::DateWindow;
use crate::fetcher::{DelayProvider, MarketFetcher};
use crate::keyword_filter::MergedTable;
use crate::models::{execution_log, MarketSegment, SegmentOutcome, SegmentReport};
use crate::report::{Report, ReportWriter};

/// What a run did, for the closing log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub window: DateWindow,
    pub segments_with_data: usize,
    pub merged_rows: usize,
    pub matched_rows: usize,
    pub report_kind: &'static str,
    pub path: PathBuf,
}

/// Choose the report for a set of segment outcomes.
///
/// Returns the report plus the merged table it was built from.
pub fn build_report(window: &DateWindow, reports: &[SegmentReport]) -> (Report, MergedTable) {
    let merged = MergedTable::from_reports(reports);
    let log = execution_log(reports);

    if merged.has_no_tables() {
        warn!("❌ No segment returned a usable table");
        let report = Report::NoData {
            window: window.to_string(),
            log,
        };
        return (report, merged);
    }

    let Some(subject) = merged.subject_column() else {
        warn!(columns = ?merged.columns, "⚠️ No subject column in merged table");
        return (Report::SubjectColumnMissing { log }, merged);
    };

    let matched = merged.filter_by_keywords(subject);
    if matched.is_empty() {
        warn!(
            subject_column = %merged.columns[subject],
            rows = merged.rows.len(),
            "⚠️ Data retrieved but nothing matched the keywords"
        );
        let report = Report::NoKeywordMatch {
            window: window.to_string(),
            log,
        };
        return (report, merged);
    }

    info!(
        subject_column = %merged.columns[subject],
        rows = merged.rows.len(),
        matched = matched.len(),
        "✅ Keyword filter applied"
    );
    for segment in MarketSegment::ALL {
        let count = matched.iter().filter(|row| row.segment == segment).count();
        if count > 0 {
            debug!(segment = %segment, matched = count, "Matches by segment");
        }
    }
    let report = Report::Announcements {
        columns: merged.columns.clone(),
        rows: matched,
    };
    (report, merged)
}

/// Run the whole job for the week before `today`.
pub async fn run(
    config: &Config,
    today: NaiveDate,
    delay: &mut dyn DelayProvider,
) -> Result<RunSummary> {
    let window = DateWindow::previous_week(today);
    info!(window = %window, "📅 Reporting window");

    let fetcher = MarketFetcher::new(config).context("failed to set up the MOPS client")?;
    let reports = fetcher.fetch_all(&window, delay).await;

    let (report, merged) = build_report(&window, &reports);

    let writer = ReportWriter::new(&config.output_dir);
    let path = writer
        .write(&window, &report)
        .context("failed to write the weekly report")?;

    let matched_rows = match &report {
        Report::Announcements { rows, .. } => rows.len(),
        _ => 0,
    };

    Ok(RunSummary {
        window,
        segments_with_data: reports
            .iter()
            .filter(|r| matches!(r.outcome, SegmentOutcome::Success(_)))
            .count(),
        merged_rows: merged.rows.len(),
        matched_rows,
        report_kind: report.kind(),
        path,
    })
}
