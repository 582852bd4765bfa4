//! The seam between the pumps and the Gemini session.

use async_trait::async_trait;
use gemini_realtime::{GeminiError, GeminiSession};

/// What the relay pumps need from an upstream session.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send_audio(&self, data: &str) -> Result<(), GeminiError>;
    async fn send_image(&self, data: &str) -> Result<(), GeminiError>;
    async fn send_text(&self, text: &str) -> Result<(), GeminiError>;
    /// The next raw message, or `None` once the upstream is no longer open.
    async fn receive(&self) -> Result<Option<String>, GeminiError>;
}

#[async_trait]
impl Upstream for GeminiSession {
    async fn send_audio(&self, data: &str) -> Result<(), GeminiError> {
        GeminiSession::send_audio(self, data).await
    }

    async fn send_image(&self, data: &str) -> Result<(), GeminiError> {
        GeminiSession::send_image(self, data).await
    }

    async fn send_text(&self, text: &str) -> Result<(), GeminiError> {
        GeminiSession::send_text(self, text).await
    }

    async fn receive(&self) -> Result<Option<String>, GeminiError> {
        GeminiSession::receive(self).await
    }
}
