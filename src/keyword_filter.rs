// =============================================================================
// keyword_filter.rs — MERGE EVERYTHING, KEEP WHAT SMELLS LIKE RISK
// =============================================================================
//
// Each segment hands back its own table, and the four tables rarely agree on
// columns. We stack them into one table whose columns are the union of all of
// them (first-seen order), tag each row with its market, then keep only rows
// whose subject line mentions one of the keywords below.
//
// The keywords are the early-warning signs a credit desk cares about: a
// company lending money to others, guaranteeing someone else's debt, or
// swapping its auditor or officers.
// =============================================================================

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use tracing::debug;

use crate::models::{MarketSegment, SegmentOutcome, SegmentReport, MARKET_COLUMN};

/// Keywords matched against the subject column. Case-sensitive substrings,
/// any one is enough.
pub const KEYWORDS: &[&str] = &[
    "資金貸與", // loans to others
    "背書保證", // endorsements and guarantees
    "會計師",   // auditor
    "更換",     // replacement
    "解任",     // dismissal
    "委任",     // appointment
];

/// A column whose name contains either of these holds the announcement text.
pub const SUBJECT_MARKERS: &[&str] = &["主旨", "案由"];

static KEYWORD_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::new(KEYWORDS).expect("keyword list is a fixed set of literals")
});

/// One row of the merged table. `values` lines up with
/// [`MergedTable::columns`]; cells a segment's table did not have are empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    pub segment: MarketSegment,
    pub values: Vec<String>,
}

/// All segments' announcement tables stacked into one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedTable {
    pub columns: Vec<String>,
    pub rows: Vec<MergedRow>,
    /// How many segments contributed a table (possibly with zero rows).
    pub tables_merged: usize,
}

impl MergedTable {
    /// Stack every successful segment's table, in segment order. Failed
    /// segments contribute nothing.
    pub fn from_reports(reports: &[SegmentReport]) -> Self {
        let mut merged = MergedTable::default();

        for report in reports {
            if let SegmentOutcome::Success(table) = &report.outcome {
                let mut source_columns = table.columns.clone();
                source_columns.push(MARKET_COLUMN.to_string());

                let positions: Vec<usize> = source_columns
                    .iter()
                    .map(|name| merged.column_index_or_insert(name))
                    .collect();

                for row in &table.rows {
                    let mut values = vec![String::new(); merged.columns.len()];
                    for (cell, &pos) in row.iter().zip(&positions) {
                        values[pos] = cell.clone();
                    }
                    if let Some(&market_pos) = positions.last() {
                        values[market_pos] = report.segment.label().to_string();
                    }
                    merged.rows.push(MergedRow {
                        segment: report.segment,
                        values,
                    });
                }

                merged.tables_merged += 1;
            }
        }

        debug!(
            tables = merged.tables_merged,
            columns = merged.columns.len(),
            rows = merged.rows.len(),
            "Merged segment tables"
        );

        merged
    }

    /// True if no segment produced a usable table.
    pub fn has_no_tables(&self) -> bool {
        self.tables_merged == 0
    }

    /// Index of `name`, adding it as a new column if unseen. Adding a column
    /// widens every existing row.
    fn column_index_or_insert(&mut self, name: &str) -> usize {
        if let Some(i) = self.columns.iter().position(|c| c == name) {
            return i;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.values.push(String::new());
        }
        self.columns.len() - 1
    }

    /// The first column, in column order, whose name contains a subject
    /// marker. First match wins, not best match.
    pub fn subject_column(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|name| SUBJECT_MARKERS.iter().any(|marker| name.contains(marker)))
    }

    /// Rows whose `column` text contains at least one keyword, in their
    /// original order.
    pub fn filter_by_keywords(&self, column: usize) -> Vec<MergedRow> {
        self.rows
            .iter()
            .filter(|row| {
                row.values
                    .get(column)
                    .is_some_and(|text| contains_keyword(text))
            })
            .cloned()
            .collect()
    }
}

/// Whether `text` mentions any of [`KEYWORDS`].
pub fn contains_keyword(text: &str) -> bool {
    KEYWORD_AUTOMATON.is_match(text)
}
