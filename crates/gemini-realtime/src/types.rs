//! Wire types for the Gemini Live `BidiGenerateContent` protocol.
//!
//! Outbound messages use the snake_case field names the endpoint accepts;
//! inbound messages arrive camelCased.

use serde::{Deserialize, Serialize};

pub const AUDIO_MIME_TYPE: &str = "audio/pcm";
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// A message sent from the relay to Gemini.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    Setup(BidiGenerateContentSetup),
    RealtimeInput(BidiGenerateContentRealtimeInput),
    ClientContent(BidiGenerateContentClientContent),
}

impl ClientMessage {
    /// Builds the setup message selecting model, voice and system instruction.
    pub fn setup(model: &str, voice: &str, system_prompt: &str) -> Self {
        Self::Setup(BidiGenerateContentSetup {
            model: format!("models/{model}"),
            generation_config: GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                },
            },
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            },
        })
    }

    /// A single media chunk streamed as realtime input.
    pub fn media_chunk(data: &str, mime_type: &str) -> Self {
        Self::RealtimeInput(BidiGenerateContentRealtimeInput {
            media_chunks: vec![Blob {
                data: data.to_string(),
                mime_type: mime_type.to_string(),
            }],
        })
    }

    /// A complete single-shot user turn.
    pub fn user_turn(text: &str) -> Self {
        Self::ClientContent(BidiGenerateContentClientContent {
            turns: vec![Content {
                role: Some(Role::User),
                parts: vec![Part {
                    text: text.to_string(),
                }],
            }],
            turn_complete: true,
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BidiGenerateContentSetup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    pub speech_config: SpeechConfig,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Audio,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BidiGenerateContentRealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Blob {
    pub data: String,
    pub mime_type: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BidiGenerateContentClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub parts: Vec<Part>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Part {
    pub text: String,
}

/// A message received from Gemini. Every field is optional; unknown fields
/// (tool calls, usage metadata, go-away notices) are ignored.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<LiveServerContent>,
    pub error: Option<ServerError>,
}

impl ServerMessage {
    /// The model turn's parts, or an empty slice when the message has none.
    pub fn parts(&self) -> &[ServerPart] {
        self.server_content
            .as_ref()
            .and_then(|content| content.model_turn.as_ref())
            .map(|turn| turn.parts.as_slice())
            .unwrap_or_default()
    }

    pub fn turn_complete(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|content| content.turn_complete)
            .unwrap_or(false)
    }

    /// True when the message carries nothing the relay knows how to handle.
    pub fn is_unrecognized(&self) -> bool {
        self.setup_complete.is_none() && self.server_content.is_none() && self.error.is_none()
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct LiveServerContent {
    pub model_turn: Option<ServerContentTurn>,
    pub turn_complete: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerContentTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    pub text: Option<String>,
    pub inline_data: Option<ServerBlob>,
}

/// The forwardable payload of a [`ServerPart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartContent<'a> {
    Audio(&'a str),
    Text(&'a str),
}

impl ServerPart {
    /// Inline data takes precedence over text. Empty payloads yield nothing.
    pub fn content(&self) -> Option<PartContent<'_>> {
        if let Some(blob) = &self.inline_data {
            return blob
                .data
                .as_deref()
                .filter(|data| !data.is_empty())
                .map(PartContent::Audio);
        }
        self.text
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(PartContent::Text)
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerBlob {
    pub data: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerError {
    pub message: Option<String>,
}

impl ServerError {
    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or("Unknown Gemini error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_message_shape() {
        let msg = ClientMessage::setup("gemini-2.0-flash-exp", "Puck", "Be brief.");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/gemini-2.0-flash-exp",
                    "generation_config": {
                        "response_modalities": ["AUDIO"],
                        "speech_config": {
                            "voice_config": {
                                "prebuilt_voice_config": { "voice_name": "Puck" }
                            }
                        }
                    },
                    "system_instruction": { "parts": [{ "text": "Be brief." }] }
                }
            })
        );
    }

    #[test]
    fn test_user_turn_is_complete() {
        let value = serde_json::to_value(ClientMessage::user_turn("hello")).unwrap();
        assert_eq!(
            value["client_content"]["turns"][0],
            json!({ "role": "user", "parts": [{ "text": "hello" }] })
        );
        assert_eq!(value["client_content"]["turn_complete"], json!(true));
    }

    #[test]
    fn test_media_chunk_mime_types() {
        let audio = serde_json::to_value(ClientMessage::media_chunk("AAAA", AUDIO_MIME_TYPE)).unwrap();
        assert_eq!(
            audio,
            json!({ "realtime_input": { "media_chunks": [{ "data": "AAAA", "mime_type": "audio/pcm" }] } })
        );
        let image = serde_json::to_value(ClientMessage::media_chunk("/9j/", IMAGE_MIME_TYPE)).unwrap();
        assert_eq!(image["realtime_input"]["media_chunks"][0]["mime_type"], "image/jpeg");
    }

    #[test]
    fn test_server_message_parts_in_order() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "UklG" } },
                        { "text": "hi" }
                    ]
                },
                "turnComplete": true
            }
        }))
        .unwrap();

        let contents: Vec<_> = msg.parts().iter().filter_map(ServerPart::content).collect();
        assert_eq!(contents, vec![PartContent::Audio("UklG"), PartContent::Text("hi")]);
        assert!(msg.turn_complete());
        assert!(!msg.is_unrecognized());
    }

    #[test]
    fn test_server_message_without_content() {
        let msg: ServerMessage = serde_json::from_value(json!({ "usageMetadata": {} })).unwrap();
        assert!(msg.parts().is_empty());
        assert!(!msg.turn_complete());
        assert!(msg.is_unrecognized());

        let setup: ServerMessage = serde_json::from_value(json!({ "setupComplete": {} })).unwrap();
        assert!(!setup.is_unrecognized());
    }

    #[test]
    fn test_empty_parts_yield_nothing() {
        let empty_audio = ServerPart {
            text: Some("ignored".into()),
            inline_data: Some(ServerBlob::default()),
        };
        assert_eq!(empty_audio.content(), None);
        assert_eq!(ServerPart::default().content(), None);
    }

    #[test]
    fn test_error_message_default() {
        let msg: ServerMessage = serde_json::from_value(json!({ "error": {} })).unwrap();
        assert_eq!(msg.error.unwrap().message_or_default(), "Unknown Gemini error");
    }
}
