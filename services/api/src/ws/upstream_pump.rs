//! Forwards Gemini responses to the client.

use super::{protocol::ServerMessage, session::send_msg, upstream::Upstream};
use crate::error::RelayError;
use axum::extract::ws::Message;
use futures_util::Sink;
use gemini_realtime::{
    GeminiError,
    types::{PartContent, ServerMessage as GeminiMessage},
};
use std::fmt::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Relays Gemini messages to the client until either side goes away.
///
/// `cancel` doubles as the client-disconnected signal: once it fires no
/// further frame is written to the client. Cancels `cancel` on exit.
pub async fn run<S, U>(
    socket_tx: &mut S,
    upstream: &U,
    cancel: CancellationToken,
) -> Result<(), RelayError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    U: Upstream + ?Sized,
{
    let _guard = cancel.clone().drop_guard();
    let result = relay(socket_tx, upstream, &cancel).await;
    info!("Exiting Gemini receive loop.");
    match result {
        Ok(()) => Ok(()),
        Err(RelayError::Upstream(GeminiError::UpstreamClosed)) => {
            info!("Gemini connection closed by peer.");
            Ok(())
        }
        Err(RelayError::Upstream(GeminiError::Transport(e))) => {
            warn!(error = %e, "Gemini connection closed with error.");
            Ok(())
        }
        Err(RelayError::ClientTransport(e)) => {
            info!(error = %e, "Client went away while sending.");
            Ok(())
        }
        Err(e @ RelayError::MalformedUpstreamMessage(_)) => {
            error!(error = %e, "Gemini receive loop: JSON decode error.");
            Err(e)
        }
        Err(e) => {
            error!(error = %e, "Error receiving from Gemini or sending to client.");
            if !cancel.is_cancelled() {
                let notice = ServerMessage::Error {
                    message: format!("Server error during Gemini communication: {e}"),
                };
                if let Err(inner) = send_msg(socket_tx, &notice).await {
                    warn!(error = %inner, "Could not send error to client.");
                }
            }
            Err(e)
        }
    }
}

async fn relay<S, U>(
    socket_tx: &mut S,
    upstream: &U,
    cancel: &CancellationToken,
) -> Result<(), RelayError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    U: Upstream + ?Sized,
{
    loop {
        let raw = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Gemini receive loop cancelled.");
                return Ok(());
            }
            raw = upstream.receive() => raw?,
        };
        let Some(raw) = raw else {
            info!("Gemini connection is no longer open.");
            return Ok(());
        };

        let msg = decode(&raw)?;

        for part in msg.parts() {
            if cancel.is_cancelled() {
                info!("Client disconnected before all parts were sent.");
                return Ok(());
            }
            match part.content() {
                Some(PartContent::Audio(data)) => {
                    send_msg(socket_tx, &ServerMessage::Audio { data: data.to_string() }).await?;
                }
                Some(PartContent::Text(text)) => {
                    info!(%text, "Received text from Gemini.");
                    send_msg(socket_tx, &ServerMessage::Text { text: text.to_string() }).await?;
                }
                None => {}
            }
        }

        if msg.turn_complete() && !cancel.is_cancelled() {
            send_msg(socket_tx, &ServerMessage::turn_complete()).await?;
        }

        if let Some(err) = &msg.error {
            let message = err.message_or_default();
            warn!(%message, "Error from Gemini API.");
            if !cancel.is_cancelled() {
                let envelope = ServerMessage::Error {
                    message: message.to_string(),
                };
                if let Err(e) = send_msg(socket_tx, &envelope).await {
                    warn!(error = %e, "Could not forward Gemini error to client.");
                }
            }
        }

        if msg.is_unrecognized() && !cancel.is_cancelled() {
            debug!(%raw, "Unrecognized message from Gemini.");
            send_msg(socket_tx, &ServerMessage::Unknown).await?;
        }
    }
}

/// Only a frame that is not JSON at all counts as malformed. Valid JSON of
/// the wrong shape is an unexpected message and is reported to the client.
fn decode(raw: &str) -> Result<GeminiMessage, RelayError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(RelayError::MalformedUpstreamMessage)?;
    if !value.is_object() {
        return Err(RelayError::UnexpectedUpstreamMessage(
            "expected a JSON object".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|e| RelayError::UnexpectedUpstreamMessage(e.to_string()))
}
