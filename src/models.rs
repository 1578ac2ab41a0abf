// =============================================================================
// models.rs — THE SHAPES OF A WEEK'S WORTH OF DISCLOSURES
// =============================================================================
//
// MOPS (Market Observation Post System) publishes every material announcement
// a Taiwanese company makes. We only ever look at one week at a time and one
// market segment at a time, and everything we learn along the way ends up in
// one of the structs below.
//
// Nothing here is persisted between runs. A run builds these, writes one
// spreadsheet, and exits.
// =============================================================================

use std::fmt;

/// Name of the column tagged onto every fetched row so the report says which
/// market the announcement came from.
pub const MARKET_COLUMN: &str = "市場類別";

/// The four market segments MOPS splits its announcements into.
///
/// Order matters: segments are fetched, merged and reported in exactly the
/// order of [`MarketSegment::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketSegment {
    /// 公開發行 — public companies that are not traded on any board.
    PublicDisclosure,
    /// 上市 — TWSE main board.
    Listed,
    /// 上櫃 — TPEx over-the-counter board.
    Otc,
    /// 興櫃 — TPEx emerging stock board.
    Emerging,
}

impl MarketSegment {
    pub const ALL: [MarketSegment; 4] = [
        MarketSegment::PublicDisclosure,
        MarketSegment::Listed,
        MarketSegment::Otc,
        MarketSegment::Emerging,
    ];

    /// The `typek` value MOPS expects in the query form.
    pub fn code(self) -> &'static str {
        match self {
            MarketSegment::PublicDisclosure => "pub",
            MarketSegment::Listed => "sii",
            MarketSegment::Otc => "otc",
            MarketSegment::Emerging => "rotc",
        }
    }

    /// The label written into the report's market column.
    pub fn label(self) -> &'static str {
        match self {
            MarketSegment::PublicDisclosure => "公開發行",
            MarketSegment::Listed => "上市",
            MarketSegment::Otc => "上櫃",
            MarketSegment::Emerging => "興櫃",
        }
    }
}

impl fmt::Display for MarketSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.code())
    }
}

/// One announcement table as pulled out of a segment's HTML response.
///
/// Every row has exactly `columns.len()` cells. All values are text; MOPS
/// mixes dates, times, codes and prose in the same table and we never need
/// any of them as anything but strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl AnnouncementTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What happened when we asked MOPS about one segment.
///
/// Every variant except `Success` is a dead end for that segment only. The
/// run always moves on to the next segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// Found the announcement table.
    Success(AnnouncementTable),
    /// MOPS answered with its "查無資料" page.
    NoData,
    /// The body had no table we could read at all.
    ParseFailure,
    /// Tables came back, but none of them had announcement headers.
    TableNotFound,
    /// Connection error, timeout, or a non-2xx status.
    TransportError(String),
}

impl SegmentOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            SegmentOutcome::Success(_) => "success",
            SegmentOutcome::NoData => "no_data",
            SegmentOutcome::ParseFailure => "parse_failure",
            SegmentOutcome::TableNotFound => "table_not_found",
            SegmentOutcome::TransportError(_) => "transport_error",
        }
    }
}

/// A segment paired with its outcome. The run keeps these in fetch order and
/// folds them into the merged table and the execution log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentReport {
    pub segment: MarketSegment,
    pub outcome: SegmentOutcome,
}

impl SegmentReport {
    pub fn new(segment: MarketSegment, outcome: SegmentOutcome) -> Self {
        Self { segment, outcome }
    }

    /// The human-readable line that goes into the diagnostic report's
    /// execution log.
    pub fn log_line(&self) -> String {
        let label = self.segment.label();
        match &self.outcome {
            SegmentOutcome::Success(table) => {
                format!("{}: 成功取得 {} 筆原始資料", label, table.len())
            }
            SegmentOutcome::NoData => format!("{}: 官方回傳查無資料", label),
            SegmentOutcome::ParseFailure => {
                format!("{}: 無法解析 HTML 表格 (可能是被擋 IP 或格式改變)", label)
            }
            SegmentOutcome::TableNotFound => format!("{}: 有回應但找不到目標表格", label),
            SegmentOutcome::TransportError(message) => {
                format!("{} 連線錯誤: {}", label, message)
            }
        }
    }
}

/// Join every segment's log line into the single string embedded in
/// diagnostic reports.
pub fn execution_log(reports: &[SegmentReport]) -> String {
    reports
        .iter()
        .map(SegmentReport::log_line)
        .collect::<Vec<_>>()
        .join(" | ")
}
