//! LINE Messaging API client: media download and reply delivery.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::channels::{MediaSource, ReplySender};
use crate::config::LineConfig;
use crate::error::ChannelError;

/// Messaging API host (reply, push).
pub const LINE_API_BASE: &str = "https://api.line.me";

/// Content API host (message attachments).
pub const LINE_DATA_API_BASE: &str = "https://api-data.line.me";

/// Maximum length of a LINE text message.
const LINE_MAX_MESSAGE_LENGTH: usize = 5000;

/// LINE Messaging API client.
pub struct LineChannel {
    access_token: SecretString,
    client: reqwest::Client,
    api_base: String,
    data_api_base: String,
}

impl LineChannel {
    pub fn new(config: &LineConfig) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        Ok(Self {
            access_token: config.channel_access_token.clone(),
            client,
            api_base: LINE_API_BASE.to_string(),
            data_api_base: LINE_DATA_API_BASE.to_string(),
        })
    }

    /// Point both API hosts somewhere else (local test servers).
    pub fn with_base_urls(mut self, api_base: &str, data_api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.data_api_base = data_api_base.trim_end_matches('/').to_string();
        self
    }

    fn content_url(&self, message_id: &str) -> String {
        format!(
            "{}/v2/bot/message/{}/content",
            self.data_api_base,
            urlencoding::encode(message_id)
        )
    }

    fn reply_url(&self) -> String {
        format!("{}/v2/bot/message/reply", self.api_base)
    }
}

#[async_trait]
impl MediaSource for LineChannel {
    async fn fetch_content(&self, message_id: &str) -> Result<Vec<u8>, ChannelError> {
        let resp = self
            .client
            .get(self.content_url(message_id))
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(message_id, status = status.as_u16(), "LINE content download failed");
            return Err(ChannelError::DownloadFailed {
                message_id: message_id.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        debug!(message_id, size = bytes.len(), "Downloaded message content");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ReplySender for LineChannel {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "replyToken": reply_token,
            "messages": [{
                "type": "text",
                "text": truncate_message(text, LINE_MAX_MESSAGE_LENGTH),
            }]
        });

        let resp = self
            .client
            .post(self.reply_url())
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "line".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "line".into(),
                reason: format!("reply returned {status}: {err}"),
            });
        }

        Ok(())
    }
}

/// Cut `text` to at most `max_chars` characters.
fn truncate_message(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
