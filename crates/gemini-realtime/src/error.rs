use tokio_tungstenite::tungstenite;

/// Errors raised by a [`crate::GeminiSession`].
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(&'static str),
    #[error("Session configuration has already been set")]
    ConfigurationAlreadySet,
    #[error("Could not reach Gemini endpoint: {0}")]
    UpstreamUnreachable(#[source] tungstenite::Error),
    #[error("Gemini setup handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("Gemini connection closed by peer")]
    UpstreamClosed,
    #[error("Malformed message from Gemini: {0}")]
    MalformedMessage(String),
    #[error("Failed to encode message for Gemini: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Gemini transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}
