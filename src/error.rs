//! Error types for ocr-sheets.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Messaging platform errors (webhook, media download, reply).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid webhook body: {0}")]
    InvalidBody(String),

    #[error("Failed to download content for message {message_id}: status {status}")]
    DownloadFailed { message_id: String, status: u16 },

    #[error("Failed to send reply on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Vision model errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Spreadsheet sink errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to load service account key {path}: {reason}")]
    Credentials { path: String, reason: String },

    #[error("Token exchange failed: {0}")]
    Auth(String),

    #[error("Append to {spreadsheet_id} failed: {reason}")]
    AppendFailed {
        spreadsheet_id: String,
        reason: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Delivery ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures inside a single pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Image fetch failed: {0}")]
    Fetch(ChannelError),

    #[error("Reply failed: {0}")]
    Reply(ChannelError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
