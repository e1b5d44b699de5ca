//! Shared types for the image processing pipeline.

use chrono::{DateTime, Local};

/// One spreadsheet row: ordered, non-empty, trimmed cells.
pub type Row = Vec<String>;

/// Timestamp format used in the metadata row.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── Inbound event ───────────────────────────────────────────────────

/// An image message delivered by the webhook.
///
/// This is the only event kind the pipeline acts on. The webhook layer
/// converts LINE's native event format into this struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEvent {
    /// Platform message ID. Unique per inbound message, reused on redelivery.
    pub message_id: String,
    /// Single-use token for replying to this event.
    pub reply_token: String,
}

impl ImageEvent {
    pub fn new(message_id: impl Into<String>, reply_token: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            reply_token: reply_token.into(),
        }
    }
}

// ── Metadata row ────────────────────────────────────────────────────

/// Build the row written above each extracted table.
pub fn metadata_row(at: DateTime<Local>, source: &str) -> Row {
    vec![at.format(TIMESTAMP_FORMAT).to_string(), source.to_string()]
}

/// Source label for an image delivered over LINE.
pub fn line_source_label(message_id: &str) -> String {
    format!("LINE Message ID: {message_id}")
}

// ── Outcome ─────────────────────────────────────────────────────────

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Already in the ledger. Nothing was done and no reply was sent.
    Duplicate,
    /// Rows were appended (count excludes the metadata row) and recorded.
    Saved { rows: usize },
    /// The extractor produced no text. Recorded, never retried.
    ExtractionFailed,
    /// A terminal failure. Not recorded, so a redelivery reprocesses it.
    Failed { reason: String },
}

impl Outcome {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Saved { .. } => "saved",
            Self::ExtractionFailed => "extraction_failed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether the message ID ends up in the ledger.
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Saved { .. } | Self::ExtractionFailed)
    }
}
