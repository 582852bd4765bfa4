use gemini_realtime::GeminiError;

/// Errors that end or interrupt a relay pump.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Malformed client message: {0}")]
    MalformedClientMessage(#[source] serde_json::Error),
    #[error("Malformed message from Gemini: {0}")]
    MalformedUpstreamMessage(#[source] serde_json::Error),
    #[error("Unexpected message shape from Gemini: {0}")]
    UnexpectedUpstreamMessage(String),
    #[error("Failed to encode message for client: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Upstream(#[from] GeminiError),
    #[error("Client connection error: {0}")]
    ClientTransport(String),
}
