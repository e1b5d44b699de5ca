//! Google Sheets `values:append` sink.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::SheetsConfig;
use crate::error::SinkError;
use crate::pipeline::types::Row;
use crate::sheets::{RowSink, ServiceAccountKey, SheetTarget, TokenProvider};

/// Sheets API host.
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

/// Appends rows to a spreadsheet as the configured service account.
pub struct GoogleSheetsSink {
    tokens: TokenProvider,
    client: reqwest::Client,
    api_base: String,
}

impl GoogleSheetsSink {
    /// Load the service account key and build the sink.
    pub async fn from_config(config: &SheetsConfig) -> Result<Self, SinkError> {
        let key = ServiceAccountKey::from_file(&config.service_account_file).await?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SinkError::Http(e.to_string()))?;
        Self::new(key, client)
    }

    pub fn new(key: ServiceAccountKey, client: reqwest::Client) -> Result<Self, SinkError> {
        let tokens = TokenProvider::new(key, client.clone())?;
        info!(account = tokens.client_email(), "Google Sheets sink ready");
        Ok(Self {
            tokens,
            client,
            api_base: SHEETS_API_BASE.to_string(),
        })
    }

    /// Send API calls to another host (local test servers).
    pub fn with_base_url(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn append_url(&self, target: &SheetTarget) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}:append",
            self.api_base,
            urlencoding::encode(&target.spreadsheet_id),
            urlencoding::encode(&target.range)
        )
    }
}

#[async_trait]
impl RowSink for GoogleSheetsSink {
    async fn append(&self, target: &SheetTarget, rows: &[Row]) -> Result<(), SinkError> {
        let token = self.tokens.access_token().await?;

        let resp = self
            .client
            .post(self.append_url(target))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token.expose_secret())
            .json(&serde_json::json!({ "values": rows }))
            .send()
            .await
            .map_err(|e| SinkError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(SinkError::AppendFailed {
                spreadsheet_id: target.spreadsheet_id.clone(),
                reason: format!("{status}: {err}"),
            });
        }

        info!(
            spreadsheet_id = %target.spreadsheet_id,
            range = %target.range,
            rows = rows.len(),
            "Appended rows to spreadsheet"
        );
        Ok(())
    }
}
