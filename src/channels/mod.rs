//! Messaging platform I/O: webhook intake, media download, replies.

pub mod channel;
pub mod line;
pub mod signature;
pub mod webhook;

pub use channel::*;
pub use line::LineChannel;
pub use webhook::{WebhookState, webhook_routes};
