//! Webhook signature verification.
//!
//! LINE signs each webhook body with HMAC-SHA256 keyed by the channel
//! secret and sends the base64 digest in `X-Line-Signature`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ChannelError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Compute the signature LINE would send for `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Check `signature` against `body` in constant time.
pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> Result<(), ChannelError> {
    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| ChannelError::InvalidSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| ChannelError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| ChannelError::InvalidSignature)
}
