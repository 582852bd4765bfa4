//! Forwards client frames to Gemini.

use super::{protocol::ClientMessage, upstream::Upstream};
use crate::error::RelayError;
use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reads client frames until the client disconnects or `cancel` fires.
///
/// Malformed or unknown envelopes are logged and skipped. A failure to write
/// to the upstream is returned. Cancels `cancel` on exit.
pub async fn run<St, E, U>(
    socket_rx: &mut St,
    upstream: &U,
    cancel: CancellationToken,
) -> Result<(), RelayError>
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    U: Upstream + ?Sized,
{
    let _guard = cancel.clone().drop_guard();
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Client receive loop cancelled.");
                break;
            }
            frame = socket_rx.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => match dispatch(text.as_str(), upstream).await {
                Ok(()) => {}
                Err(RelayError::MalformedClientMessage(e)) => {
                    warn!(error = %e, "Received invalid message structure, skipping.");
                }
                Err(e) => return Err(e),
            },
            Some(Ok(Message::Binary(data))) => {
                warn!(len = data.len(), "Received binary message, not handled.");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                info!(?frame, "Client sent close frame.");
                break;
            }
            Some(Err(e)) => {
                info!(error = %e, "Client connection closed with error.");
                break;
            }
            None => {
                info!("Client disconnected.");
                break;
            }
        }
    }
    info!("Exiting client receive loop.");
    Ok(())
}

async fn dispatch<U: Upstream + ?Sized>(text: &str, upstream: &U) -> Result<(), RelayError> {
    let msg: ClientMessage =
        serde_json::from_str(text).map_err(RelayError::MalformedClientMessage)?;
    match msg {
        ClientMessage::Audio { data } => upstream.send_audio(&data).await?,
        ClientMessage::Image { data } => upstream.send_image(&data).await?,
        ClientMessage::Text { data } => upstream.send_text(&data).await?,
        ClientMessage::Config { .. } => warn!("Ignoring configuration sent after handshake."),
        ClientMessage::Unknown => warn!(message = %text, "Unknown message type, skipping."),
    }
    Ok(())
}
