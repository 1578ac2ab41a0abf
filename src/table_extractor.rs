// =============================================================================
// table_extractor.rs — FINDING THE ONE TABLE THAT MATTERS
// =============================================================================
//
// A MOPS response is an HTML fragment with a handful of tables in it: layout
// tables, a title bar, a form with hidden inputs, and somewhere in the middle
// the actual list of announcements. We parse every table into rows of text,
// then keep the first one whose header row looks like an announcement list.
//
// html5ever never refuses input, so "malformed HTML" here just means "HTML
// with no usable table in it". That is reported as an error value, not a
// panic, and the caller turns it into a per-segment outcome.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;

use crate::models::AnnouncementTable;

/// A table is the announcement list if any header cell contains one of these.
pub const EXPECTED_HEADER_TOKENS: &[&str] = &["公司代號", "主旨", "案由"];

/// Upper bound on a single cell's colspan. Anything larger is a broken page.
const MAX_COLSPAN: usize = 64;

static TABLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("static selector"));
static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("static selector"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no HTML table with any rows in the response")]
    NoTables,
}

/// Parse every non-empty `<table>` in the document, in document order.
pub fn parse_tables(html: &str) -> Result<Vec<AnnouncementTable>, ExtractError> {
    let tables: Vec<AnnouncementTable> = parse_document(html)?
        .into_iter()
        .map(|parsed| parsed.table)
        .collect();
    Ok(tables)
}

fn parse_document(html: &str) -> Result<Vec<ParsedTable>, ExtractError> {
    let document = Html::parse_document(html);

    let tables: Vec<ParsedTable> = document
        .select(&TABLE_SELECTOR)
        .filter_map(parse_table)
        .collect();

    debug!(tables = tables.len(), "Parsed HTML tables");

    if tables.is_empty() {
        return Err(ExtractError::NoTables);
    }
    Ok(tables)
}

/// Whether a parsed table's headers mark it as the announcement list.
pub fn is_announcement_table(table: &AnnouncementTable) -> bool {
    table.columns.iter().any(|column| {
        EXPECTED_HEADER_TOKENS
            .iter()
            .any(|token| column.contains(token))
    })
}

/// Parse the response and pick the announcement table.
///
/// `Err` means nothing table-shaped came back at all. `Ok(None)` means tables
/// came back but none of them had announcement headers.
pub fn extract_announcements(html: &str) -> Result<Option<AnnouncementTable>, ExtractError> {
    let tables = parse_document(html)?;
    Ok(tables
        .into_iter()
        .find(ParsedTable::is_announcement_table)
        .map(|parsed| parsed.table))
}

/// One `<table>` after parsing, plus every header row it had.
struct ParsedTable {
    header_rows: Vec<Vec<String>>,
    table: AnnouncementTable,
}

impl ParsedTable {
    /// Like [`is_announcement_table`], but a token in any header row counts,
    /// so a title bar stacked over the column names does not hide the table.
    fn is_announcement_table(&self) -> bool {
        is_announcement_table(&self.table)
            || self.header_rows.iter().flatten().any(|name| {
                EXPECTED_HEADER_TOKENS
                    .iter()
                    .any(|token| name.contains(token))
            })
    }
}

/// Turn one `<table>` into header names plus text rows. `None` if the table
/// has no rows of its own.
fn parse_table(table: ElementRef<'_>) -> Option<ParsedTable> {
    let rows: Vec<Vec<(CellKind, String)>> = table
        .select(&ROW_SELECTOR)
        .filter(|row| belongs_to(*row, table))
        .map(row_cells)
        .collect();

    if rows.is_empty() {
        return None;
    }

    // The header starts at the first row carrying <th> cells and runs through
    // any all-<th> rows right after it. Everything else with at least one
    // <td> is data.
    let header_start = rows.iter().position(|cells| has_kind(cells, CellKind::Header));
    let header_range = header_start.map(|start| {
        let len = rows[start + 1..]
            .iter()
            .take_while(|cells| {
                has_kind(cells, CellKind::Header) && !has_kind(cells, CellKind::Data)
            })
            .count();
        start..start + 1 + len
    });

    let header_rows: Vec<Vec<String>> = header_range
        .clone()
        .map(|range| rows[range].iter().map(|cells| texts(cells)).collect())
        .unwrap_or_default();

    let data: Vec<Vec<String>> = rows
        .iter()
        .enumerate()
        .filter(|(i, _)| !header_range.as_ref().is_some_and(|range| range.contains(i)))
        .filter(|(_, cells)| has_kind(cells, CellKind::Data))
        .map(|(_, cells)| texts(cells))
        .collect();

    let mut names = column_names(&header_rows);
    let data_width = data.iter().map(Vec::len).max().unwrap_or(0);
    if data_width > names.len() {
        debug!(
            header_width = names.len(),
            data_width,
            "Data rows wider than header, naming extra columns by position"
        );
        let header_width = names.len();
        names.extend((header_width..data_width).map(|i| i.to_string()));
    }
    let columns = dedup_column_names(names);

    let width = columns.len();
    let rows = data
        .into_iter()
        .map(|mut cells| {
            cells.resize(width, String::new());
            cells
        })
        .collect();

    Some(ParsedTable {
        header_rows,
        table: AnnouncementTable { columns, rows },
    })
}

/// Column names from stacked header rows: the lowest non-empty name in each
/// column wins.
fn column_names(header_rows: &[Vec<String>]) -> Vec<String> {
    let width = header_rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|col| {
            header_rows
                .iter()
                .rev()
                .filter_map(|row| row.get(col))
                .find(|name| !name.is_empty())
                .cloned()
                .unwrap_or_default()
        })
        .collect()
}

fn has_kind(cells: &[(CellKind, String)], kind: CellKind) -> bool {
    cells.iter().any(|(tag, _)| *tag == kind)
}

fn texts(cells: &[(CellKind, String)]) -> Vec<String> {
    cells.iter().map(|(_, text)| text.clone()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Header,
    Data,
}

/// The row's own `<th>`/`<td>` cells with normalized text, colspans expanded.
fn row_cells(row: ElementRef<'_>) -> Vec<(CellKind, String)> {
    let mut cells = Vec::new();
    for cell in row.children().filter_map(ElementRef::wrap) {
        let kind = match cell.value().name() {
            "th" => CellKind::Header,
            "td" => CellKind::Data,
            _ => continue,
        };
        let span = cell
            .value()
            .attr("colspan")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1)
            .min(MAX_COLSPAN);
        let text = normalize_text(&cell.text().collect::<String>());
        for _ in 0..span {
            cells.push((kind, text.clone()));
        }
    }
    cells
}

/// True if `row`'s closest enclosing `<table>` is `table`, so rows of nested
/// tables are not pulled into their parent.
fn belongs_to(row: ElementRef<'_>, table: ElementRef<'_>) -> bool {
    row.ancestors()
        .find(|node| {
            node.value()
                .as_element()
                .is_some_and(|element| element.name() == "table")
        })
        .is_some_and(|owner| owner.id() == table.id())
}

/// Repeated header names get `.1`, `.2`, ... so every column is addressable.
/// A suffixed name that is already taken gets suffixed again.
fn dedup_column_names(names: Vec<String>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(names.len());
    let mut counts: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let unique = if used.contains(&name) {
                let count = counts.entry(name.clone()).or_insert(0);
                loop {
                    *count += 1;
                    let candidate = format!("{}.{}", name, count);
                    if !used.contains(&candidate) {
                        break candidate;
                    }
                }
            } else {
                name
            };
            used.insert(unique.clone());
            unique
        })
        .collect()
}

/// Collapse whitespace runs (including full-width and non-breaking spaces)
/// into one space and trim.
fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOPS_PAGE: &str = r#"
        <html><body>
        <table class="noBorder"><tr><td>本資料由公司提供</td></tr></table>
        <table class="hasBorder">
          <tr class="tblHead">
            <th>公司代號</th><th>公司名稱</th><th>發言日期</th><th>發言時間</th><th>主旨</th>
          </tr>
          <tr class="even">
            <td>1101</td><td>台泥</td><td>113/03/04</td><td>17:30:01</td>
            <td>公告本公司
                董事會決議資金貸與子公司</td>
          </tr>
          <tr class="odd">
            <td>2330</td><td>台積電</td><td>113/03/05</td><td>18:00:00</td><td>公告股利</td>
          </tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_finds_announcement_table_among_layout_tables() {
        let table = extract_announcements(MOPS_PAGE).unwrap().unwrap();
        assert_eq!(
            table.columns,
            vec!["公司代號", "公司名稱", "發言日期", "發言時間", "主旨"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][4], "公告本公司 董事會決議資金貸與子公司");
        assert_eq!(table.rows[1][0], "2330");
    }

    #[test]
    fn test_tables_without_expected_headers_are_not_found() {
        let html = "<table><tr><th>日期</th><th>說明</th></tr><tr><td>1</td><td>2</td></tr></table>";
        assert_eq!(extract_announcements(html), Ok(None));
    }

    #[test]
    fn test_no_tables_is_an_error_not_a_panic() {
        assert_eq!(extract_announcements(""), Err(ExtractError::NoTables));
        assert_eq!(
            extract_announcements("<html><body><p>Access denied</p>"),
            Err(ExtractError::NoTables)
        );
        assert_eq!(
            extract_announcements("<table><tr><td>unterminated"),
            Ok(None)
        );
        assert_eq!(extract_announcements("<table></table>"), Err(ExtractError::NoTables));
    }

    #[test]
    fn test_first_matching_table_wins() {
        let html = r#"
            <table><tr><th>案由</th></tr><tr><td>first</td></tr></table>
            <table><tr><th>主旨</th></tr><tr><td>second</td></tr></table>
        "#;
        let table = extract_announcements(html).unwrap().unwrap();
        assert_eq!(table.rows, vec![vec!["first".to_string()]]);
    }

    #[test]
    fn test_nested_table_rows_stay_with_their_own_table() {
        let html = r#"
            <table id="outer">
              <tr><td>
                <table id="inner">
                  <tr><th>公司代號</th><th>主旨</th></tr>
                  <tr><td>1101</td><td>委任會計師</td></tr>
                </table>
              </td></tr>
            </table>
        "#;
        let tables = parse_tables(html).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].columns, vec!["0"]);
        assert_eq!(tables[1].columns, vec!["公司代號", "主旨"]);
        assert_eq!(tables[1].rows, vec![vec!["1101".to_string(), "委任會計師".to_string()]]);
    }

    #[test]
    fn test_colspan_duplicates_and_ragged_rows() {
        let html = r#"
            <table>
              <tr><th colspan="2">日期</th><th>主旨</th></tr>
              <tr><td>113</td><td>03</td><td>a</td><td>overflow</td></tr>
              <tr><td colspan="2">113/03</td></tr>
            </table>
        "#;
        let table = extract_announcements(html).unwrap().unwrap();
        assert_eq!(table.columns, vec!["日期", "日期.1", "主旨", "3"]);
        assert_eq!(table.rows[0], vec!["113", "03", "a", "overflow"]);
        assert_eq!(table.rows[1], vec!["113/03", "113/03", "", ""]);
    }

    #[test]
    fn test_title_row_above_column_names() {
        let html = r#"
            <table>
              <tr><th colspan="3">本資料由各公司提供</th></tr>
              <tr><th>公司代號</th><th>公司名稱</th><th>主旨</th></tr>
              <tr><td>1101</td><td>台泥</td><td>資金貸與他人</td></tr>
            </table>
        "#;
        let table = extract_announcements(html).unwrap().unwrap();
        assert_eq!(table.columns, vec!["公司代號", "公司名稱", "主旨"]);
        assert_eq!(
            table.rows,
            vec![vec!["1101".to_string(), "台泥".to_string(), "資金貸與他人".to_string()]]
        );
    }

    #[test]
    fn test_token_in_upper_header_row_still_counts() {
        let html = r#"
            <table>
              <tr><th colspan="2">主旨</th></tr>
              <tr><th>日期</th><th>內容</th></tr>
              <tr><td>113/03/04</td><td>委任會計師</td></tr>
            </table>
        "#;
        let table = extract_announcements(html).unwrap().unwrap();
        assert_eq!(table.columns, vec!["日期", "內容"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_short_lower_header_row_borrows_upper_names() {
        let html = r#"
            <table>
              <tr><th>公司代號</th><th>發言日期</th><th>主旨</th></tr>
              <tr><th></th><th>年月日</th></tr>
              <tr><td>1101</td><td>113/03/04</td><td>更換會計師</td></tr>
            </table>
        "#;
        let table = extract_announcements(html).unwrap().unwrap();
        assert_eq!(table.columns, vec!["公司代號", "年月日", "主旨"]);
    }

    #[test]
    fn test_wide_data_rows_keep_extra_cells() {
        let html = r#"
            <table>
              <tr><th>公司代號</th><th>公司名稱</th></tr>
              <tr><td>1101</td><td>台泥</td><td>資金貸與他人</td></tr>
            </table>
        "#;
        let table = extract_announcements(html).unwrap().unwrap();
        assert_eq!(table.columns, vec!["公司代號", "公司名稱", "2"]);
        assert_eq!(table.rows[0], vec!["1101", "台泥", "資金貸與他人"]);
    }

    #[test]
    fn test_suffixed_names_never_collide() {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            dedup_column_names(names(&["主旨", "主旨", "主旨.1"])),
            vec!["主旨", "主旨.1", "主旨.1.1"]
        );
        assert_eq!(
            dedup_column_names(names(&["a", "a.1", "a", "a"])),
            vec!["a", "a.1", "a.2", "a.3"]
        );

        let html = r#"
            <table>
              <tr><th>主旨</th><th>主旨</th><th>主旨.1</th></tr>
              <tr><td>x</td><td>y</td><td>z</td></tr>
            </table>
        "#;
        let table = extract_announcements(html).unwrap().unwrap();
        assert_eq!(table.columns, vec!["主旨", "主旨.1", "主旨.1.1"]);
        assert_eq!(table.rows[0], vec!["x", "y", "z"]);
    }

    #[test]
    fn test_header_only_table_has_zero_rows() {
        let html = "<table><tr><th>公司代號</th><th>主旨</th></tr></table>";
        let table = extract_announcements(html).unwrap().unwrap();
        assert!(table.is_empty());
    }
}
