//! Image text extraction.
//!
//! The pipeline only sees the `TextExtractor` trait. The production
//! implementation calls Gemini's `generateContent` with the image inlined.

pub mod gemini;

pub use gemini::GeminiExtractor;

use async_trait::async_trait;

use crate::error::ExtractionError;

/// Turns image bytes into free-form text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Name of the backing model, for logs.
    fn model_name(&self) -> &str;

    /// Extract text from `image`. `Ok(None)` means the model returned no text.
    async fn extract(&self, image: &[u8]) -> Result<Option<String>, ExtractionError>;
}

/// Image container formats recognised by their magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Sniff the format from the first bytes. Unknown data is treated as JPEG,
    /// which is what LINE delivers for photos.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Self::Png
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Self::Gif
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Self::Webp
        } else {
            Self::Jpeg
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

/// Keep only the body of the first markdown code fence, if there is one.
///
/// Vision models often answer with the table inside ```` ``` ```` fences,
/// sometimes with prose before or after; fence lines and prose would
/// otherwise become rows of their own.
pub fn strip_code_fence(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];
    // Skip the info string ("```csv").
    let Some(newline) = after.find('\n') else {
        return text;
    };
    let body = &after[newline + 1..];
    match body.find("```") {
        Some(end) => body[..end].trim_end(),
        None => body.trim_end(),
    }
}
