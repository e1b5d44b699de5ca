//! ocr-sheets: LINE image messages to spreadsheet rows.

pub mod channels;
pub mod config;
pub mod error;
pub mod extraction;
pub mod ledger;
pub mod pipeline;
pub mod sheets;
