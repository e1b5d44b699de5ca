//! Spreadsheet sink.
//!
//! Extracted tables are appended to a Google Sheets range using a service
//! account. The pipeline depends only on `RowSink`.

pub mod auth;
pub mod google;

pub use auth::{ServiceAccountKey, TokenProvider};
pub use google::GoogleSheetsSink;

use async_trait::async_trait;

use crate::config::SheetsConfig;
use crate::error::SinkError;
use crate::pipeline::types::Row;

/// Where rows are appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub spreadsheet_id: String,
    /// A1-notation anchor; the API appends after the last row of its table.
    pub range: String,
}

impl SheetTarget {
    pub fn new(spreadsheet_id: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
        }
    }
}

impl From<&SheetsConfig> for SheetTarget {
    fn from(config: &SheetsConfig) -> Self {
        Self::new(&config.spreadsheet_id, &config.range)
    }
}

/// Append-only tabular store.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Append `rows` below the existing data of `target`, in order.
    async fn append(&self, target: &SheetTarget, rows: &[Row]) -> Result<(), SinkError>;
}
