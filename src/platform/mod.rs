pub mod telegram;

use async_trait::async_trait;
use thiserror::Error;

/// A text message received from the chat platform
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Platform chat identifier the reply goes back to
    pub chat_id: i64,
    /// Display name of the sender
    pub sender_name: String,
    /// The message text
    pub text: String,
}

#[derive(Debug, Error)]
#[error("failed to deliver message to chat {chat_id}: {reason}")]
pub struct DeliveryError {
    pub chat_id: i64,
    pub reason: String,
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError>;
}
