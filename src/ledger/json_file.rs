//! Whole-file JSON ledger.
//!
//! The file holds a JSON array of message IDs in the order they were
//! recorded. Every call reads the whole file; `record` rewrites it. This is
//! only sound with a single writer, which `ImageProcessor` guarantees by
//! serializing events.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::DeliveryLedger;

/// File-backed delivery ledger.
pub struct JsonFileLedger {
    path: PathBuf,
}

impl JsonFileLedger {
    /// Create a ledger stored at `path`. The file is created on first record.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every recorded ID, oldest first.
    pub async fn entries(&self) -> Result<Vec<String>, LedgerError> {
        if !fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }

        let raw = fs::read_to_string(&self.path).await?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&raw).map_err(|e| LedgerError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn store(&self, entries: &[String]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string(entries)?;
        fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryLedger for JsonFileLedger {
    async fn has(&self, id: &str) -> Result<bool, LedgerError> {
        Ok(self.entries().await?.iter().any(|e| e == id))
    }

    async fn record(&self, id: &str) -> Result<(), LedgerError> {
        let mut entries = self.entries().await?;
        if entries.iter().any(|e| e == id) {
            debug!(id, "Message already in ledger");
            return Ok(());
        }
        entries.push(id.to_string());
        self.store(&entries).await?;
        debug!(id, total = entries.len(), "Recorded message in ledger");
        Ok(())
    }
}
