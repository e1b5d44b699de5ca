//! Gemini vision extractor.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GeminiConfig;
use crate::error::ExtractionError;
use crate::extraction::{ImageFormat, TextExtractor, strip_code_fence};

/// Generative Language API host.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Instruction sent alongside every image.
const EXTRACTION_PROMPT: &str = "Extract the text contained in this image and output it as a table. \
     Put each row on its own line and separate columns with a tab or a comma.";

/// Extractor backed by Gemini's `generateContent`.
pub struct GeminiExtractor {
    api_key: SecretString,
    model: String,
    client: reqwest::Client,
    api_base: String,
}

impl GeminiExtractor {
    pub fn new(config: &GeminiConfig) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExtractionError::RequestFailed {
                provider: "gemini".into(),
                reason: format!("Failed to create client: {e}"),
            })?;

        info!("Using Gemini (model: {})", config.model);
        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
            api_base: GEMINI_API_BASE.to_string(),
        })
    }

    /// Send requests to another host (local test servers).
    pub fn with_base_url(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }
}

#[async_trait]
impl TextExtractor for GeminiExtractor {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn extract(&self, image: &[u8]) -> Result<Option<String>, ExtractionError> {
        let request = build_request(image);

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::RequestFailed {
                provider: "gemini".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ExtractionError::RequestFailed {
                provider: "gemini".into(),
                reason: format!("generateContent returned {status}: {err}"),
            });
        }

        let raw = resp.text().await.map_err(|e| ExtractionError::InvalidResponse {
            provider: "gemini".into(),
            reason: e.to_string(),
        })?;
        let text = parse_response(&raw)?;
        debug!(
            model = %self.model,
            chars = text.as_deref().map_or(0, str::len),
            "Gemini extraction finished"
        );
        Ok(text.map(|t| strip_code_fence(&t).to_string()))
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

fn build_request(image: &[u8]) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                RequestPart::Text {
                    text: EXTRACTION_PROMPT.to_string(),
                },
                RequestPart::InlineData {
                    inline_data: InlineData {
                        mime_type: ImageFormat::detect(image).mime_type(),
                        data: STANDARD.encode(image),
                    },
                },
            ],
        }],
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_response(raw: &str) -> Result<Option<String>, ExtractionError> {
    let response: GenerateContentResponse =
        serde_json::from_str(raw).map_err(|e| ExtractionError::InvalidResponse {
            provider: "gemini".into(),
            reason: format!("JSON parse error: {e}"),
        })?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> GeminiConfig {
        GeminiConfig {
            api_key: SecretString::from("key"),
            model: "gemini-1.5-flash".into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn endpoint_includes_model() {
        let ex = GeminiExtractor::new(&config()).unwrap();
        assert_eq!(
            ex.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(ex.model_name(), "gemini-1.5-flash");
    }

    #[test]
    fn request_inlines_image_with_sniffed_mime() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let json = serde_json::to_value(build_request(&png)).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert!(parts[0]["text"].as_str().unwrap().contains("table"));
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], STANDARD.encode(png));
    }

    #[test]
    fn response_text_parts_concatenated() {
        let raw = r#"{"candidates": [{"content": {"parts": [{"text": "a,b\n"}, {"text": "c,d"}]}}]}"#;
        assert_eq!(parse_response(raw).unwrap().as_deref(), Some("a,b\nc,d"));
    }

    #[test]
    fn response_without_candidates_is_none() {
        assert_eq!(parse_response(r#"{"candidates": []}"#).unwrap(), None);
        assert_eq!(parse_response(r#"{}"#).unwrap(), None);
    }

    #[test]
    fn blocked_candidate_without_content_is_none() {
        let raw = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        assert_eq!(parse_response(raw).unwrap(), None);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            parse_response("<html>"),
            Err(ExtractionError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn extract_fails_without_server() {
        let ex = GeminiExtractor::new(&config())
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        assert!(ex.extract(b"img").await.is_err());
    }
}
