//! Text-to-table conversion for extracted image text.
//!
//! Each line becomes one row, split on a single comma or tab. Fields are
//! trimmed and empty fields are dropped; a line with no fields left is
//! skipped entirely. There is no quoting, so a field cannot itself contain a
//! comma or a tab.

use std::sync::LazyLock;

use regex::Regex;

use crate::pipeline::types::Row;

static DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\t,]").expect("delimiter pattern is valid"));

/// Parse free-form text into rows of non-empty cells, in line order.
pub fn parse_table(text: &str) -> Vec<Row> {
    text.split('\n').filter_map(parse_line).collect()
}

/// Parse one line; `None` when it holds no non-empty field.
fn parse_line(line: &str) -> Option<Row> {
    let row: Row = DELIMITER
        .split(line)
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(String::from)
        .collect();

    (!row.is_empty()).then_some(row)
}
