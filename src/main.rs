// =============================================================================
// M O P S   W E E K L Y   W A T C H
// =============================================================================
//
// Once a week: ask Taiwan's Market Observation Post System for everything
// companies announced last week, in all four market segments, keep the
// announcements about lending, guarantees, auditor changes, dismissals and
// appointments, and write them to weekly_report_<sunday>.xlsx.
//
// One thread. Four requests. One file. Every time.
// =============================================================================

mod config;
mod date_window;
mod fetcher;
mod keyword_filter;
mod models;
mod pipeline;
mod report;
mod table_extractor;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::fetcher::RandomDelay;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.with_ansi(true).init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(config.log_json);

    info!("📡 MOPS weekly watch starting");
    info!(
        endpoint = %config.endpoint_url,
        timeout_secs = config.request_timeout.as_secs(),
        min_delay_ms = config.min_delay.as_millis() as u64,
        max_delay_ms = config.max_delay.as_millis() as u64,
        output_dir = %config.output_dir.display(),
        "✅ Configuration loaded"
    );

    let today = config
        .reference_date
        .unwrap_or_else(|| Local::now().date_naive());
    let mut delay = RandomDelay::new(config.min_delay, config.max_delay);

    let summary = pipeline::run(&config, today, &mut delay).await?;

    info!("═══════════════════════════════════════════════════════");
    info!(
        window = %summary.window,
        segments_with_data = summary.segments_with_data,
        merged_rows = summary.merged_rows,
        matched_rows = summary.matched_rows,
        report = summary.report_kind,
        path = %summary.path.display(),
        "🏁 Weekly run complete"
    );
    info!("═══════════════════════════════════════════════════════");

    Ok(())
}
