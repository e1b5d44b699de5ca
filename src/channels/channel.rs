//! Messaging platform collaborator traits.

use async_trait::async_trait;

use crate::error::ChannelError;

/// Downloads the raw bytes attached to an inbound message.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Fetch the content of `message_id`. A non-success status is an error.
    async fn fetch_content(&self, message_id: &str) -> Result<Vec<u8>, ChannelError>;
}

/// Sends a user-facing text reply to an inbound event.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Deliver `text` using the event's single-use `reply_token`.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), ChannelError>;
}
