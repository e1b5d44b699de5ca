//! Configuration types.
//!
//! Everything is read once at startup from the environment (a `.env` file is
//! loaded first by `main`) and handed to collaborators by reference.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default listen port for the webhook server.
pub const DEFAULT_PORT: u16 = 8000;

/// Default ledger location, relative to the working directory.
pub const DEFAULT_LEDGER_PATH: &str = "saved_messages.json";

/// Default vision model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Default append range.
pub const DEFAULT_SHEET_RANGE: &str = "Sheet1!A1";

/// LINE Messaging API credentials.
#[derive(Debug, Clone)]
pub struct LineConfig {
    pub channel_access_token: SecretString,
    pub channel_secret: SecretString,
    /// Timeout for media download and reply calls.
    pub timeout: Duration,
}

/// Gemini extraction settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub timeout: Duration,
}

/// Google Sheets sink settings.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub range: String,
    /// Path to the service account JSON key file.
    pub service_account_file: PathBuf,
    pub timeout: Duration,
}

/// Server and local storage settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub ledger_path: PathBuf,
    /// When set, downloaded images are archived here.
    pub image_dir: Option<PathBuf>,
    /// When set, logs are also written to a daily-rolling file here.
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub line: LineConfig,
    pub gemini: GeminiConfig,
    pub sheets: SheetsConfig,
    pub server: ServerConfig,
}

/// Key lookup used by the `from_lookup` constructors.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn required(lookup: Lookup<'_>, key: &str) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn optional(lookup: Lookup<'_>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl LineConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            channel_access_token: SecretString::from(required(lookup, "LINE_CHANNEL_ACCESS_TOKEN")?),
            channel_secret: SecretString::from(required(lookup, "LINE_CHANNEL_SECRET")?),
            timeout: Duration::from_secs(30),
        })
    }
}

impl GeminiConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: SecretString::from(required(lookup, "GOOGLE_API_KEY")?),
            model: optional(lookup, "GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            timeout: Duration::from_secs(120),
        })
    }
}

impl SheetsConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            spreadsheet_id: required(lookup, "SPREADSHEET_ID")?,
            range: optional(lookup, "SHEET_RANGE").unwrap_or_else(|| DEFAULT_SHEET_RANGE.to_string()),
            service_account_file: PathBuf::from(required(lookup, "SERVICE_ACCOUNT_FILE")?),
            timeout: Duration::from_secs(60),
        })
    }
}

impl ServerConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let port = match optional(lookup, "OCR_SHEETS_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "OCR_SHEETS_PORT".into(),
                message: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            ledger_path: optional(lookup, "OCR_SHEETS_LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH)),
            image_dir: optional(lookup, "OCR_SHEETS_IMAGE_DIR").map(PathBuf::from),
            log_dir: optional(lookup, "OCR_SHEETS_LOG_DIR").map(PathBuf::from),
        })
    }
}

impl AppConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            line: LineConfig::from_lookup(lookup)?,
            gemini: GeminiConfig::from_lookup(lookup)?,
            sheets: SheetsConfig::from_lookup(lookup)?,
            server: ServerConfig::from_lookup(lookup)?,
        })
    }
}

/// Process environment lookup.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Show the first few characters of a secret for startup logs.
pub fn preview(secret: &str) -> String {
    let head: String = secret.chars().take(6).collect();
    if secret.chars().count() > 6 {
        format!("{head}...")
    } else {
        "***".to_string()
    }
}
