//! Runs one image event through the pipeline.
//!
//! At most one reply per event, none for duplicates.
//!
//! Flow:
//! 1. Ledger check → duplicates stop here silently
//! 2. Download → extract → parse → append (with metadata row)
//! 3. Record the message ID, then reply
//!
//! `handle()` is the only result boundary. Download, sink and ledger
//! failures become a single generic error reply and leave the ID
//! unrecorded so a redelivery is processed again.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::channels::{MediaSource, ReplySender};
use crate::error::PipelineError;
use crate::extraction::{ImageFormat, TextExtractor};
use crate::ledger::DeliveryLedger;
use crate::pipeline::table::parse_table;
use crate::pipeline::types::{ImageEvent, Outcome, Row, line_source_label, metadata_row};
use crate::sheets::{RowSink, SheetTarget};

/// Reply after rows were appended.
pub const SUCCESS_REPLY: &str =
    "Extracted the text from your image and saved it to the spreadsheet.";

/// Reply when the model returned no text.
pub const EXTRACTION_FAILED_REPLY: &str = "Could not extract any text from the image.";

/// Reply for every other failure.
pub const ERROR_REPLY: &str = "Something went wrong while processing your image.";

/// Collaborators the processor drives.
pub struct ProcessorDeps {
    pub media: Arc<dyn MediaSource>,
    pub replies: Arc<dyn ReplySender>,
    pub extractor: Arc<dyn TextExtractor>,
    pub sink: Arc<dyn RowSink>,
    pub ledger: Arc<dyn DeliveryLedger>,
}

/// Dedupes, extracts and appends image events, then replies.
pub struct ImageProcessor {
    deps: ProcessorDeps,
    target: SheetTarget,
    image_dir: Option<PathBuf>,
    /// Held for a whole event so the ledger's check-then-record never interleaves.
    gate: Mutex<()>,
}

impl ImageProcessor {
    pub fn new(deps: ProcessorDeps, target: SheetTarget) -> Self {
        Self {
            deps,
            target,
            image_dir: None,
            gate: Mutex::new(()),
        }
    }

    /// Also write every downloaded image to `dir`.
    pub fn with_image_archive(mut self, dir: Option<PathBuf>) -> Self {
        self.image_dir = dir;
        self
    }

    /// Process one image event end to end.
    ///
    /// Returns `Err` only when the generic error reply itself could not be
    /// delivered; every other failure is reported to the user and returned
    /// as `Outcome::Failed`.
    pub async fn handle(&self, event: ImageEvent) -> Result<Outcome, PipelineError> {
        let _guard = self.gate.lock().await;

        info!(message_id = %event.message_id, "Processing image message");

        let outcome = match self.run(&event).await {
            Ok(Outcome::Duplicate) => {
                info!(message_id = %event.message_id, "Image already processed");
                return Ok(Outcome::Duplicate);
            }
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    message_id = %event.message_id,
                    error = %e,
                    "Error handling image message"
                );
                self.deps
                    .replies
                    .reply(&event.reply_token, ERROR_REPLY)
                    .await
                    .map_err(PipelineError::Reply)?;
                return Ok(Outcome::Failed {
                    reason: e.to_string(),
                });
            }
        };

        let text = match outcome {
            Outcome::ExtractionFailed => EXTRACTION_FAILED_REPLY,
            _ => SUCCESS_REPLY,
        };
        // The ID is already recorded; a lost reply is not worth reprocessing.
        if let Err(e) = self.deps.replies.reply(&event.reply_token, text).await {
            warn!(message_id = %event.message_id, error = %e, "Failed to send reply");
        }

        info!(
            message_id = %event.message_id,
            outcome = outcome.label(),
            recorded = outcome.is_recorded(),
            "Image message done"
        );
        Ok(outcome)
    }

    async fn run(&self, event: &ImageEvent) -> Result<Outcome, PipelineError> {
        let id = event.message_id.as_str();

        if self.deps.ledger.has(id).await? {
            return Ok(Outcome::Duplicate);
        }

        let image = self
            .deps
            .media
            .fetch_content(id)
            .await
            .map_err(PipelineError::Fetch)?;
        self.archive_image(id, &image).await;

        let outcome = match self.extract(id, &image).await {
            Some(text) => {
                let values = rows_for_sink(&line_source_label(id), &text);
                let rows = values.len() - 1;
                self.deps.sink.append(&self.target, &values).await?;
                info!(message_id = id, rows, "Data added to spreadsheet");
                Outcome::Saved { rows }
            }
            None => Outcome::ExtractionFailed,
        };

        self.deps.ledger.record(id).await?;
        Ok(outcome)
    }

    /// Run the extractor; errors and empty text both count as "no text".
    async fn extract(&self, id: &str, image: &[u8]) -> Option<String> {
        match self.deps.extractor.extract(image).await {
            Ok(Some(text)) if !text.is_empty() => Some(text),
            Ok(_) => {
                warn!(message_id = id, model = self.deps.extractor.model_name(), "No text extracted");
                None
            }
            Err(e) => {
                error!(message_id = id, error = %e, "Error extracting text from image");
                None
            }
        }
    }

    async fn archive_image(&self, id: &str, image: &[u8]) {
        let Some(dir) = &self.image_dir else {
            return;
        };
        let name = format!(
            "{}.{}",
            sanitize_file_stem(id),
            ImageFormat::detect(image).extension()
        );
        let path = dir.join(name);

        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, image).await
        }
        .await;

        match result {
            Ok(()) => debug!(path = %path.display(), "Archived image"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to archive image"),
        }
    }
}

/// Metadata row followed by the rows parsed from `text`.
pub fn rows_for_sink(source: &str, text: &str) -> Vec<Row> {
    let parsed = parse_table(text);
    let mut values = Vec::with_capacity(parsed.len() + 1);
    values.push(metadata_row(Local::now(), source));
    values.extend(parsed);
    values
}

/// Keep a message ID usable as a file name.
fn sanitize_file_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() { "image".to_string() } else { stem }
}
