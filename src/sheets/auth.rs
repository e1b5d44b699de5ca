//! Service account authentication for Google APIs.
//!
//! Uses the OAuth 2.0 JWT bearer grant: an RS256-signed assertion built from
//! the service account key is exchanged at the key's `token_uri` for a
//! short-lived access token. Tokens are cached until shortly before expiry.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use ring::rand::SystemRandom;
use ring::signature::{RSA_PKCS1_SHA256, RsaKeyPair};
use rustls_pki_types::PrivatePkcs8KeyDer;
use rustls_pki_types::pem::PemObject;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SinkError;

/// OAuth scope for reading and writing spreadsheets.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Default token endpoint when the key file omits `token_uri`.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime; Google rejects anything over one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// The fields of a service account JSON key that the grant needs.
#[derive(Debug, Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: SecretString,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct RawServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Load a key file downloaded from the cloud console.
    pub async fn from_file(path: &Path) -> Result<Self, SinkError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SinkError::Credentials {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_json(&raw).map_err(|e| match e {
            SinkError::Credentials { reason, .. } => SinkError::Credentials {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, SinkError> {
        let key: RawServiceAccountKey =
            serde_json::from_str(raw).map_err(|e| SinkError::Credentials {
                path: "<inline>".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client_email: key.client_email,
            private_key: SecretString::from(key.private_key),
            token_uri: key.token_uri,
        })
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// How long a token with the given `expires_in` stays in the cache.
/// Values outside `0..=ASSERTION_LIFETIME_SECS` are clamped.
fn cache_lifetime(expires_in: i64) -> Duration {
    let secs = expires_in.clamp(0, ASSERTION_LIFETIME_SECS) - EXPIRY_MARGIN_SECS;
    Duration::seconds(secs.max(0))
}

/// Issues and caches access tokens for one service account.
pub struct TokenProvider {
    key: ServiceAccountKey,
    key_pair: RsaKeyPair,
    rng: SystemRandom,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(key: ServiceAccountKey, client: reqwest::Client) -> Result<Self, SinkError> {
        let der = PrivatePkcs8KeyDer::from_pem_slice(key.private_key.expose_secret().as_bytes())
            .map_err(|e| SinkError::Credentials {
                path: key.client_email.clone(),
                reason: format!("private_key is not a PKCS#8 PEM: {e}"),
            })?;
        let key_pair =
            RsaKeyPair::from_pkcs8(der.secret_pkcs8_der()).map_err(|e| SinkError::Credentials {
                path: key.client_email.clone(),
                reason: format!("private_key rejected: {e}"),
            })?;

        Ok(Self {
            key,
            key_pair,
            rng: SystemRandom::new(),
            client,
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// A valid access token, fetching a new one when the cache is stale.
    pub async fn access_token(&self) -> Result<SecretString, SinkError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref()
            && token.expires_at > now
        {
            return Ok(token.token.clone());
        }

        let assertion = self.assertion(now.timestamp())?;
        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| SinkError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(SinkError::Auth(format!("token endpoint returned {status}: {err}")));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| SinkError::Auth(format!("invalid token response: {e}")))?;

        let token = SecretString::from(body.access_token);
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: now + cache_lifetime(body.expires_in),
        });

        info!(account = %self.key.client_email, expires_in = body.expires_in, "Obtained access token");
        Ok(token)
    }

    /// Build the signed JWT assertion for `iat`.
    fn assertion(&self, iat: i64) -> Result<String, SinkError> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let claims = serde_json::to_vec(&claims).map_err(|e| SinkError::Auth(e.to_string()))?;
        let signing_input = format!("{header}.{}", URL_SAFE_NO_PAD.encode(claims));

        let mut signature = vec![0; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(
                &RSA_PKCS1_SHA256,
                &self.rng,
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|_| SinkError::Auth("failed to sign assertion".into()))?;

        debug!(account = %self.key.client_email, "Signed token assertion");
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }
}
