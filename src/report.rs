// =============================================================================
// report.rs — THE SPREADSHEET AT THE END OF THE PIPE
// =============================================================================
//
// Every run writes exactly one workbook, `weekly_report_<sunday>.xlsx`. If
// there were matching announcements, that is what's in it. If not, it holds a
// single diagnostic row saying why, plus the per-segment execution log, so
// whoever opens Monday's file can tell "quiet week" apart from "MOPS blocked
// us" without digging through logs.
//
// Re-running for the same week overwrites the same file. Document properties
// are pinned to the week's end date so identical inputs produce identical
// bytes.
// =============================================================================

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use rust_xlsxwriter::{DocProperties, ExcelDateTime, Format, Workbook, XlsxError};
use thiserror::Error;
use tracing::info;

use crate::date_window::DateWindow;
use crate::keyword_filter::MergedRow;

pub const STATUS_COLUMN: &str = "狀態";
pub const WINDOW_COLUMN: &str = "檢查區間";
pub const LOG_COLUMN: &str = "執行紀錄";

pub const STATUS_NO_KEYWORD_MATCH: &str = "有抓到資料，但無符合關鍵字(資金貸與/背書/會計師)之公告";
pub const STATUS_SUBJECT_COLUMN_MISSING: &str = "找不到主旨欄位";
pub const STATUS_NO_DATA: &str = "完全無資料 (可能被 MOPS 封鎖 IP)";

/// Excel refuses cell strings longer than this.
const MAX_CELL_CHARS: usize = 32_767;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("spreadsheet serialization failed: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("report has {0} columns, more than a worksheet can hold")]
    TooManyColumns(usize),
}

/// What the workbook will contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// Rows that matched the keywords, under the merged column headers.
    Announcements {
        columns: Vec<String>,
        rows: Vec<MergedRow>,
    },
    /// Data came back, but nothing mentioned a keyword.
    NoKeywordMatch { window: String, log: String },
    /// Data came back, but no column looked like a subject line.
    SubjectColumnMissing { log: String },
    /// No segment produced a usable table.
    NoData { window: String, log: String },
}

impl Report {
    pub fn kind(&self) -> &'static str {
        match self {
            Report::Announcements { .. } => "announcements",
            Report::NoKeywordMatch { .. } => "no_keyword_match",
            Report::SubjectColumnMissing { .. } => "subject_column_missing",
            Report::NoData { .. } => "no_data",
        }
    }

    /// The header row and data rows exactly as they will appear in the sheet.
    pub fn to_sheet(&self) -> Sheet {
        match self {
            Report::Announcements { columns, rows } => Sheet {
                headers: columns.clone(),
                rows: rows.iter().map(|row| row.values.clone()).collect(),
            },
            Report::NoKeywordMatch { window, log } => Sheet::diagnostic(
                &[STATUS_COLUMN, WINDOW_COLUMN, LOG_COLUMN],
                &[STATUS_NO_KEYWORD_MATCH, window.as_str(), log.as_str()],
            ),
            Report::SubjectColumnMissing { log } => Sheet::diagnostic(
                &[STATUS_COLUMN, LOG_COLUMN],
                &[STATUS_SUBJECT_COLUMN_MISSING, log.as_str()],
            ),
            Report::NoData { window, log } => Sheet::diagnostic(
                &[STATUS_COLUMN, WINDOW_COLUMN, LOG_COLUMN],
                &[STATUS_NO_DATA, window.as_str(), log.as_str()],
            ),
        }
    }
}

/// A plain grid of text: one header row, any number of data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    fn diagnostic(headers: &[&str], values: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: vec![values.iter().map(|v| v.to_string()).collect()],
        }
    }
}

/// `weekly_report_2024-03-10.xlsx`
pub fn report_filename(window: &DateWindow) -> String {
    format!("weekly_report_{}.xlsx", window.week_end.format("%Y-%m-%d"))
}

pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, window: &DateWindow) -> PathBuf {
        self.output_dir.join(report_filename(window))
    }

    /// Write the workbook, replacing any earlier report for the same week.
    pub fn write(&self, window: &DateWindow, report: &Report) -> Result<PathBuf, ReportError> {
        let bytes = render_workbook(window, report)?;
        let path = self.path_for(window);

        fs::create_dir_all(&self.output_dir).map_err(|source| ReportError::Io {
            path: self.output_dir.clone(),
            source,
        })?;
        write_file(&path, &bytes)?;

        info!(
            path = %path.display(),
            kind = report.kind(),
            bytes = bytes.len(),
            "📄 Report written"
        );
        Ok(path)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    fs::write(path, bytes).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize the report to xlsx bytes. Only the first sheet is used.
pub fn render_workbook(window: &DateWindow, report: &Report) -> Result<Vec<u8>, ReportError> {
    let sheet = report.to_sheet();

    let mut workbook = Workbook::new();
    let created = ExcelDateTime::from_ymd(
        window.week_end.year() as u16,
        window.week_end.month() as u8,
        window.week_end.day() as u8,
    )?;
    let properties = DocProperties::new().set_creation_datetime(&created);
    workbook.set_properties(&properties);

    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();

    for (col, header) in sheet.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, column_index(col)?, clip(header), &header_format)?;
    }

    for (r, row) in sheet.rows.iter().enumerate() {
        let row_index = (r + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet.write_string(row_index, column_index(col)?, clip(value))?;
        }
    }

    worksheet.autofit();

    Ok(workbook.save_to_buffer()?)
}

fn column_index(col: usize) -> Result<u16, ReportError> {
    u16::try_from(col).map_err(|_| ReportError::TooManyColumns(col + 1))
}

/// Cut a string to Excel's cell limit on a char boundary.
fn clip(s: &str) -> &str {
    match s.char_indices().nth(MAX_CELL_CHARS) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketSegment;
    use chrono::NaiveDate;

    fn window() -> DateWindow {
        DateWindow::previous_week(NaiveDate::from_ymd_opt(2024, 3, 13).unwrap())
    }

    fn announcements() -> Report {
        Report::Announcements {
            columns: vec!["公司代號".into(), "主旨".into(), "市場類別".into()],
            rows: vec![MergedRow {
                segment: MarketSegment::Listed,
                values: vec!["1101".into(), "資金貸與".into(), "上市".into()],
            }],
        }
    }

    #[test]
    fn test_filename_uses_week_end_date() {
        assert_eq!(report_filename(&window()), "weekly_report_2024-03-10.xlsx");
    }

    #[test]
    fn test_no_data_sheet_carries_window_and_log() {
        let report = Report::NoData {
            window: window().to_string(),
            log: "上市 連線錯誤: timed out".into(),
        };
        let sheet = report.to_sheet();
        assert_eq!(sheet.headers, vec![STATUS_COLUMN, WINDOW_COLUMN, LOG_COLUMN]);
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0][0], STATUS_NO_DATA);
        assert_eq!(sheet.rows[0][1], "2024-03-04 ~ 2024-03-10");
        assert_eq!(sheet.rows[0][2], "上市 連線錯誤: timed out");
    }

    #[test]
    fn test_subject_missing_sheet_has_no_window() {
        let sheet = Report::SubjectColumnMissing { log: "log".into() }.to_sheet();
        assert_eq!(sheet.headers, vec![STATUS_COLUMN, LOG_COLUMN]);
        assert_eq!(sheet.rows, vec![vec![STATUS_SUBJECT_COLUMN_MISSING.to_string(), "log".to_string()]]);
    }

    #[test]
    fn test_announcement_sheet_keeps_market_column() {
        let sheet = announcements().to_sheet();
        assert_eq!(sheet.headers.last().map(String::as_str), Some("市場類別"));
        assert_eq!(sheet.rows[0][2], "上市");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let first = render_workbook(&window(), &announcements()).unwrap();
        let second = render_workbook(&window(), &announcements()).unwrap();
        assert!(first.starts_with(b"PK"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_write_creates_and_overwrites_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("reports"));

        let first = writer
            .write(&window(), &Report::NoData { window: window().to_string(), log: String::new() })
            .unwrap();
        let second = writer.write(&window(), &announcements()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.file_name().unwrap(), "weekly_report_2024-03-10.xlsx");
        let bytes = fs::read(&second).unwrap();
        assert_eq!(bytes, render_workbook(&window(), &announcements()).unwrap());
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        let long = "資".repeat(MAX_CELL_CHARS + 10);
        assert_eq!(clip(&long).chars().count(), MAX_CELL_CHARS);
        assert_eq!(clip("short"), "short");
    }
}
