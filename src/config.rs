// =============================================================================
// config.rs — THE KNOBS
// =============================================================================
//
// Out of the box this needs no configuration at all: every default below is
// exactly what the weekly job has always used. The environment variables are
// there for pointing the fetcher somewhere else, slowing it down further when
// MOPS gets grumpy, or re-running a past week.
//
// What is deliberately NOT here: the keyword list, the header tokens, the
// market segments. Those define what the report means, so they are constants.
// =============================================================================

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use url::Url;

pub const DEFAULT_ENDPOINT_URL: &str = "https://mopsov.twse.com.tw/mops/web/ajax_t05st02";

/// A desktop Chrome user agent. MOPS serves an empty page to anything that
/// admits to being a script.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MOPS_WEEKLY_ENDPOINT_URL is not a valid URL ({value}): {source}")]
    InvalidEndpoint {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{key} must be a whole number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("delay range is inverted: min {min_ms}ms > max {max_ms}ms")]
    InvertedDelayRange { min_ms: u64, max_ms: u64 },

    #[error("MOPS_WEEKLY_REFERENCE_DATE must be YYYY-MM-DD, got {0:?}")]
    InvalidReferenceDate(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Where the announcement query form is POSTed.
    pub endpoint_url: Url,

    /// Sent verbatim as the User-Agent header.
    pub user_agent: String,

    /// Per-request timeout. Default: 30 seconds.
    pub request_timeout: Duration,

    /// Bounds of the random pause between two segment requests.
    /// Default: 3–6 seconds.
    pub min_delay: Duration,
    pub max_delay: Duration,

    /// Directory the spreadsheet is written into. Default: current directory.
    pub output_dir: PathBuf,

    /// Pretend today is this date. Unset means the local system date.
    pub reference_date: Option<NaiveDate>,

    /// Emit logs as JSON lines instead of the human format.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint_url: Url::parse(DEFAULT_ENDPOINT_URL)
                .expect("default endpoint URL is a valid literal"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            min_delay: Duration::from_millis(3_000),
            max_delay: Duration::from_millis(6_000),
            output_dir: PathBuf::from("."),
            reference_date: None,
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from `MOPS_WEEKLY_*` environment variables, after
    /// pulling in a `.env` file if one is lying around.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. `from_env` is this over
    /// `std::env`; tests feed it a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let endpoint_url = match lookup("MOPS_WEEKLY_ENDPOINT_URL") {
            Some(value) => Url::parse(&value)
                .map_err(|source| ConfigError::InvalidEndpoint { value, source })?,
            None => defaults.endpoint_url,
        };

        let user_agent = lookup("MOPS_WEEKLY_USER_AGENT").unwrap_or(defaults.user_agent);

        let timeout_secs = parse_u64(&lookup, "MOPS_WEEKLY_TIMEOUT_SECS", 30)?;
        let min_delay_ms = parse_u64(&lookup, "MOPS_WEEKLY_MIN_DELAY_MS", 3_000)?;
        let max_delay_ms = parse_u64(&lookup, "MOPS_WEEKLY_MAX_DELAY_MS", 6_000)?;
        if min_delay_ms > max_delay_ms {
            return Err(ConfigError::InvertedDelayRange {
                min_ms: min_delay_ms,
                max_ms: max_delay_ms,
            });
        }

        let output_dir = lookup("MOPS_WEEKLY_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir);

        let reference_date = match lookup("MOPS_WEEKLY_REFERENCE_DATE") {
            Some(value) => Some(
                NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                    .map_err(|_| ConfigError::InvalidReferenceDate(value))?,
            ),
            None => None,
        };

        let log_json = lookup("MOPS_WEEKLY_LOG_JSON")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Config {
            endpoint_url,
            user_agent,
            request_timeout: Duration::from_secs(timeout_secs),
            min_delay: Duration::from_millis(min_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            output_dir,
            reference_date,
            log_json,
        })
    }
}

fn parse_u64<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        None => Ok(default),
    }
}
