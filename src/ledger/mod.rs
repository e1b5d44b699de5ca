//! Delivery ledger. Remembers which message IDs were already processed.
//!
//! The webhook platform redelivers events it believes were not handled; the
//! ledger turns those redeliveries into silent no-ops.

pub mod json_file;

pub use json_file::JsonFileLedger;

use async_trait::async_trait;

use crate::error::LedgerError;

/// Set of processed message IDs.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Whether `id` has been recorded. A ledger with no backing data is empty.
    async fn has(&self, id: &str) -> Result<bool, LedgerError>;

    /// Record `id`. Recording an ID that is already present is a no-op.
    async fn record(&self, id: &str) -> Result<(), LedgerError>;
}
