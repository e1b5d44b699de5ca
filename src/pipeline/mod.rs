//! Image-to-spreadsheet pipeline.
//!
//! Every image event flows through:
//! 1. Ledger check: already-processed message IDs are dropped silently
//! 2. Media download from the messaging platform
//! 3. Text extraction by the vision model
//! 4. `table::parse_table()` turns text into rows
//! 5. Sink append, ledger record, one reply to the user

pub mod processor;
pub mod scan;
pub mod table;
pub mod types;

pub use processor::{ImageProcessor, ProcessorDeps, rows_for_sink};
pub use scan::{ScanReport, scan_file};
pub use table::parse_table;
pub use types::{ImageEvent, Outcome, Row};
