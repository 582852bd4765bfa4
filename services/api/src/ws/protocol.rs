//! Defines the WebSocket message protocol between the browser client and the relay.

use crate::error::RelayError;
use gemini_realtime::SessionConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Close reason sent when the first client message is not a configuration.
pub const CONFIG_REQUIRED_REASON: &str = "First message must be configuration";

/// Messages sent from the client (browser) to the relay.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Selects voice and system prompt. Only valid as the first message.
    Config { config: SessionConfig },
    /// A base64 PCM audio chunk.
    Audio { data: String },
    /// A base64 JPEG frame.
    Image { data: String },
    /// A complete text turn.
    Text { data: String },
    /// Any type this relay does not know about.
    #[serde(other)]
    Unknown,
}

/// Messages sent from the relay to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A chunk of base64 audio spoken by the model.
    Audio { data: String },
    /// Text produced by the model.
    Text { text: String },
    /// The model finished its turn. `data` is always `true`.
    TurnComplete { data: bool },
    /// An error reported by Gemini or by the relay itself.
    Error { message: String },
    /// Gemini sent something the relay does not translate.
    Unknown,
}

impl ServerMessage {
    pub fn turn_complete() -> Self {
        Self::TurnComplete { data: true }
    }
}

/// Outcome of reading the first client message.
#[derive(Debug, PartialEq)]
pub enum Handshake {
    Config(SessionConfig),
    /// The message was not a configuration; carries a diagnostic for logging.
    Rejected(String),
}

/// Decodes the first client message.
///
/// Anything that is not `{"type":"config",...}` is rejected. A config message
/// whose body cannot be decoded is an error.
pub fn parse_handshake(text: &str) -> Result<Handshake, RelayError> {
    let Ok(mut value) = serde_json::from_str::<Value>(text) else {
        return Ok(Handshake::Rejected("first message is not valid JSON".to_string()));
    };
    match value.get("type").and_then(Value::as_str) {
        Some("config") => {}
        Some(other) => {
            return Ok(Handshake::Rejected(format!(
                "expected `config` message, got `{other}`"
            )));
        }
        None => return Ok(Handshake::Rejected("message has no `type`".to_string())),
    }
    let config = value.get_mut("config").map(Value::take).unwrap_or_default();
    serde_json::from_value(config)
        .map(Handshake::Config)
        .map_err(RelayError::MalformedClientMessage)
}
