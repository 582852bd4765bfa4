//! The connection to Gemini for one relayed conversation.

use crate::{
    error::GeminiError,
    types::{AUDIO_MIME_TYPE, ClientMessage, IMAGE_MIME_TYPE},
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, protocol::Message},
};
use tracing::{debug, info, trace, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Per-conversation settings chosen by the client during its handshake.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub voice: String,
    pub system_prompt: String,
}

/// A Gemini Live session.
///
/// The connection halves are `None` until [`GeminiSession::connect`] has
/// received the setup acknowledgement, and again after [`GeminiSession::close`].
/// While they are `None` every send is a no-op and `receive` yields `None`.
pub struct GeminiSession {
    api_key: String,
    model: String,
    endpoint: String,
    config: OnceLock<SessionConfig>,
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    stream: Mutex<Option<SplitStream<WsStream>>>,
}

impl GeminiSession {
    /// Creates an unconnected session against the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Result<Self, GeminiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GeminiError::ConfigurationMissing("GEMINI_API_KEY"));
        }
        Ok(Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            config: OnceLock::new(),
            sink: Mutex::new(None),
            stream: Mutex::new(None),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.get()
    }

    /// Stores the session configuration. It can only be set once.
    pub fn set_config(&self, config: SessionConfig) -> Result<(), GeminiError> {
        info!(voice = %config.voice, "Setting Gemini session config.");
        self.config
            .set(config)
            .map_err(|_| GeminiError::ConfigurationAlreadySet)
    }

    /// Opens the connection, sends the setup message and waits for Gemini to
    /// acknowledge it. Returns the raw acknowledgement.
    pub async fn connect(&self) -> Result<String, GeminiError> {
        let config = self.config.get().ok_or(GeminiError::ConfigurationMissing(
            "session config must be set before connecting",
        ))?;

        info!(
            endpoint = %self.endpoint,
            model = %self.model,
            key_prefix = %self.api_key.chars().take(5).collect::<String>(),
            "Connecting to Gemini."
        );
        // Err only means a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let (mut ws_stream, _) = connect_async(url)
            .await
            .map_err(GeminiError::UpstreamUnreachable)?;
        info!("Connected to Gemini WebSocket.");

        let setup = ClientMessage::setup(&self.model, &config.voice, &config.system_prompt);
        let payload = serde_json::to_string(&setup)?;
        debug!(%payload, "Sending setup message.");
        ws_stream
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| GeminiError::HandshakeFailed(e.to_string()))?;

        let ack = loop {
            match ws_stream.next().await {
                Some(Ok(msg)) => match into_payload(msg) {
                    Ok(Some(text)) => break text,
                    Ok(None) => continue,
                    Err(GeminiError::UpstreamClosed) => {
                        return Err(GeminiError::HandshakeFailed(
                            "connection closed before setup acknowledgement".to_string(),
                        ));
                    }
                    Err(e) => return Err(GeminiError::HandshakeFailed(e.to_string())),
                },
                Some(Err(e)) => return Err(GeminiError::HandshakeFailed(e.to_string())),
                None => {
                    return Err(GeminiError::HandshakeFailed(
                        "connection ended before setup acknowledgement".to_string(),
                    ));
                }
            }
        };
        info!(%ack, "Received setup acknowledgement.");

        let (sink, stream) = ws_stream.split();
        *self.sink.lock().await = Some(sink);
        *self.stream.lock().await = Some(stream);
        Ok(ack)
    }

    pub async fn is_connected(&self) -> bool {
        self.sink.lock().await.is_some()
    }

    pub async fn send_audio(&self, data: &str) -> Result<(), GeminiError> {
        trace!(len = data.len(), "Sending audio chunk.");
        self.send(&ClientMessage::media_chunk(data, AUDIO_MIME_TYPE))
            .await
    }

    pub async fn send_image(&self, data: &str) -> Result<(), GeminiError> {
        debug!(len = data.len(), "Sending image.");
        self.send(&ClientMessage::media_chunk(data, IMAGE_MIME_TYPE))
            .await
    }

    /// Sends `text` as a complete user turn.
    pub async fn send_text(&self, text: &str) -> Result<(), GeminiError> {
        info!(%text, "Sending text turn.");
        self.send(&ClientMessage::user_turn(text)).await
    }

    async fn send(&self, msg: &ClientMessage) -> Result<(), GeminiError> {
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            debug!("Gemini connection is not open, dropping outbound message.");
            return Ok(());
        };
        let payload = serde_json::to_string(msg)?;
        sink.send(Message::Text(payload.into())).await?;
        Ok(())
    }

    /// Waits for the next data message from Gemini.
    ///
    /// Returns `Ok(None)` when the session is not connected and
    /// [`GeminiError::UpstreamClosed`] when Gemini closes while we wait.
    pub async fn receive(&self) -> Result<Option<String>, GeminiError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Ok(None);
        };
        loop {
            match stream.next().await {
                Some(Ok(msg)) => {
                    if let Some(payload) = into_payload(msg)? {
                        return Ok(Some(payload));
                    }
                }
                Some(Err(
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                ))
                | None => return Err(GeminiError::UpstreamClosed),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Closes the connection. Safe to call more than once.
    pub async fn close(&self) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            info!("Closing Gemini WebSocket connection.");
            if let Err(e) = sink.close().await {
                warn!(error = %e, "Error while closing Gemini WebSocket.");
            }
        }
        self.stream.lock().await.take();
    }
}

/// Extracts the JSON payload of a data frame. Control frames yield `None`.
fn into_payload(msg: Message) -> Result<Option<String>, GeminiError> {
    match msg {
        Message::Text(text) => Ok(Some(text.as_str().to_owned())),
        Message::Binary(bytes) => String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| GeminiError::MalformedMessage(e.to_string())),
        Message::Close(frame) => {
            debug!(?frame, "Gemini sent close frame.");
            Err(GeminiError::UpstreamClosed)
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
    }
}
