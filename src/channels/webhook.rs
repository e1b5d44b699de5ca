//! Webhook endpoint for signed LINE event batches.
//!
//! `POST /callback` verifies `X-Line-Signature` over the raw body before
//! parsing anything, then hands each image message to the processor in body
//! order. Other event kinds are acknowledged and ignored.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::channels::signature::{self, SIGNATURE_HEADER};
use crate::error::ChannelError;
use crate::pipeline::{ImageEvent, ImageProcessor};

// ── Webhook body ────────────────────────────────────────────────────

/// Top-level webhook payload.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

/// One event in a webhook payload. Only the fields the pipeline needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub message: Option<EventMessage>,
    #[serde(default)]
    pub delivery_context: Option<DeliveryContext>,
}

/// The `message` object of a message event.
#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryContext {
    #[serde(default)]
    pub is_redelivery: bool,
}

impl WebhookEvent {
    /// The image event carried by this webhook event, if it is one.
    pub fn image_event(&self) -> Option<ImageEvent> {
        if self.kind != "message" {
            return None;
        }
        let message = self.message.as_ref().filter(|m| m.kind == "image")?;
        let reply_token = self.reply_token.as_deref()?;
        Some(ImageEvent::new(&message.id, reply_token))
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivery_context
            .as_ref()
            .is_some_and(|c| c.is_redelivery)
    }
}

/// Parse a raw webhook body.
pub fn parse_body(body: &[u8]) -> Result<WebhookBody, ChannelError> {
    serde_json::from_slice(body).map_err(|e| ChannelError::InvalidBody(e.to_string()))
}

// ── Routes ──────────────────────────────────────────────────────────

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    pub processor: Arc<ImageProcessor>,
    pub channel_secret: SecretString,
}

/// Build the webhook router (`POST /callback`, `GET /health`).
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/callback", post(callback))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// POST /callback
async fn callback(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(sig) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        error!(error = %ChannelError::MissingSignature, "Rejecting webhook");
        return StatusCode::BAD_REQUEST.into_response();
    };

    if let Err(e) = signature::verify(
        state.channel_secret.expose_secret().as_bytes(),
        &body,
        sig,
    ) {
        warn!(error = %e, "Rejecting webhook");
        return StatusCode::BAD_REQUEST.into_response();
    }

    let payload = match parse_body(&body) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "Unexpected webhook payload");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    debug!(
        destination = payload.destination.as_deref().unwrap_or("-"),
        events = payload.events.len(),
        "Webhook received"
    );

    for event in &payload.events {
        let Some(image) = event.image_event() else {
            debug!(kind = %event.kind, "Ignoring non-image event");
            continue;
        };

        info!(
            message_id = %image.message_id,
            redelivery = event.is_redelivery(),
            "Received image message"
        );

        if let Err(e) = state.processor.handle(image).await {
            error!(error = %e, "Unexpected error while dispatching event");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    (StatusCode::OK, "OK").into_response()
}
