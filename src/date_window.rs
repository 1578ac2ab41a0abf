// =============================================================================
// date_window.rs — LAST WEEK, IN TWO CALENDARS
// =============================================================================
//
// The report always covers the previous Monday through Sunday, counted from
// whatever day the job happens to run on. MOPS wants those dates in the
// Republic of China (Minguo) calendar: same month, same day, year minus 1911.
// 2024 is year 113. Nobody outside Taiwan enjoys this.
// =============================================================================

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};

/// Gregorian year of ROC year 0.
pub const ROC_YEAR_OFFSET: i32 = 1911;

/// A date in the ROC civil calendar. Month and day are the Gregorian ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RocDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl From<NaiveDate> for RocDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year() - ROC_YEAR_OFFSET,
            month: date.month(),
            day: date.day(),
        }
    }
}

/// The Monday–Sunday window a run reports on. Built once, never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub start_roc: RocDate,
    pub end_roc: RocDate,
}

impl DateWindow {
    /// The full Monday–Sunday week before the week containing `today`.
    ///
    /// Going back `weekday + 7` days from any day lands on last week's
    /// Monday, so running on a Monday still reports the week that just ended
    /// and running on a Sunday does not report the week still in progress.
    pub fn previous_week(today: NaiveDate) -> Self {
        let days_back = i64::from(today.weekday().num_days_from_monday()) + 7;
        let week_start = today - Duration::days(days_back);
        let week_end = week_start + Duration::days(6);

        Self {
            week_start,
            week_end,
            start_roc: RocDate::from(week_start),
            end_roc: RocDate::from(week_end),
        }
    }
}

impl fmt::Display for DateWindow {
    /// `2024-03-04 ~ 2024-03-10`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ~ {}",
            self.week_start.format("%Y-%m-%d"),
            self.week_end.format("%Y-%m-%d")
        )
    }
}
