//! Generation provider trait and the role-tagged message type it consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One role-tagged message sent to a generation backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A text-generation backend: ordered messages in, one reply out.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate a reply for the given conversation.
    async fn chat_with_history(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<String>;

    /// Canonical provider name (e.g. `"cloudflare"`).
    fn name(&self) -> &str;
}
