//! One-shot scan of a local image file.
//!
//! Same extract → parse → append path as the webhook, without the ledger
//! or any reply. The metadata row carries the file path instead of a
//! message ID.

use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::extraction::TextExtractor;
use crate::pipeline::processor::rows_for_sink;
use crate::sheets::{RowSink, SheetTarget};

/// Result of scanning one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Extracted text, `None` when the model returned nothing.
    pub text: Option<String>,
    /// Parsed rows appended, excluding the metadata row.
    pub rows: usize,
}

/// Extract the table in `path` and append it to `target`.
///
/// Nothing is appended when no text comes back. Extractor errors propagate.
pub async fn scan_file(
    path: &Path,
    extractor: &dyn TextExtractor,
    sink: &dyn RowSink,
    target: &SheetTarget,
) -> Result<ScanReport> {
    let image = tokio::fs::read(path).await?;
    info!(path = %path.display(), bytes = image.len(), "Scanning image");

    let Some(text) = extractor.extract(&image).await?.filter(|t| !t.is_empty()) else {
        warn!(path = %path.display(), "No text extracted");
        return Ok(ScanReport { text: None, rows: 0 });
    };

    let values = rows_for_sink(&path.display().to_string(), &text);
    let rows = values.len() - 1;
    sink.append(target, &values).await?;

    Ok(ScanReport {
        text: Some(text),
        rows,
    })
}
