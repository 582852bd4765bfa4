//! Manages the WebSocket connection lifecycle for one relayed client.

use super::{
    client_pump,
    protocol::{CONFIG_REQUIRED_REASON, Handshake, ServerMessage, parse_handshake},
    upstream_pump,
};
use crate::{error::RelayError, registry::SessionRegistry, state::AppState};
use anyhow::{Context, Result};
use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, StreamExt, stream::SplitStream};
use gemini_realtime::GeminiSession;
use std::{fmt::Display, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Close reasons longer than this are truncated (the frame limit is 123 bytes).
const MAX_CLOSE_REASON_LEN: usize = 120;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

/// Supervises a single client connection from accept to teardown.
///
/// Nothing escapes this function: faults are logged, reported to the client
/// with a 1011 close, and always followed by teardown of the Gemini session
/// and its registry entry.
#[instrument(name = "relay_session", skip_all, fields(%client_id))]
async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    info!("WebSocket connection accepted.");
    let (mut socket_tx, mut socket_rx) = socket.split();

    let session = match state.new_gemini_session() {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!(error = %e, "Could not create Gemini session.");
            close_with(&mut socket_tx, close_code::ERROR, format!("Server error: {e}")).await;
            return;
        }
    };
    let registration = Registration::new(state.registry.clone(), client_id, session.clone());

    if let Err(e) = run_session(&session, &mut socket_tx, &mut socket_rx).await {
        error!("Relay session failed: {e:#}");
        close_with(&mut socket_tx, close_code::ERROR, format!("Server error: {e:#}")).await;
    }

    registration.teardown().await;
}

/// Handshake, then both pumps until either side finishes.
async fn run_session<S>(
    session: &GeminiSession,
    socket_tx: &mut S,
    socket_rx: &mut SplitStream<WebSocket>,
) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let config = match receive_handshake(socket_rx).await? {
        Some(Handshake::Config(config)) => config,
        Some(Handshake::Rejected(reason)) => {
            warn!(%reason, "Rejecting client without configuration.");
            close_with(socket_tx, close_code::POLICY, CONFIG_REQUIRED_REASON).await;
            return Ok(());
        }
        None => {
            info!("Client disconnected before sending configuration.");
            return Ok(());
        }
    };

    session.set_config(config)?;
    session
        .connect()
        .await
        .context("Failed to establish Gemini session")?;
    info!("Gemini connection established.");

    // Both pumps hold a clone; the first to exit cancels it and the other
    // unwinds at its next await. join! returns only after both have exited.
    let cancel = CancellationToken::new();
    let (client_result, upstream_result) = tokio::join!(
        client_pump::run(socket_rx, session, cancel.clone()),
        upstream_pump::run(socket_tx, session, cancel.clone()),
    );
    debug!(?client_result, ?upstream_result, "Both pumps exited.");

    client_result.context("Client receive loop failed")?;
    upstream_result.context("Gemini receive loop failed")?;

    close_with(socket_tx, close_code::NORMAL, "Session ended").await;
    Ok(())
}

/// Reads the first data frame from the client.
///
/// Returns `None` if the client leaves before sending anything.
async fn receive_handshake(socket_rx: &mut SplitStream<WebSocket>) -> Result<Option<Handshake>> {
    loop {
        match socket_rx.next().await {
            Some(Ok(Message::Text(text))) => {
                info!("Received configuration message.");
                return Ok(Some(parse_handshake(text.as_str())?));
            }
            Some(Ok(Message::Binary(_))) => {
                return Ok(Some(Handshake::Rejected(
                    "first message is a binary frame".to_string(),
                )));
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Err(e)) => {
                return Err(e).context("Failed to read configuration from client");
            }
        }
    }
}

/// Owns the registry entry for one connection.
///
/// [`Registration::teardown`] closes the Gemini session and removes the entry.
/// If the supervising task unwinds before reaching it, `Drop` still removes
/// the entry.
struct Registration {
    registry: SessionRegistry,
    client_id: String,
    session: Arc<GeminiSession>,
    released: bool,
}

impl Registration {
    fn new(registry: SessionRegistry, client_id: String, session: Arc<GeminiSession>) -> Self {
        registry.insert(client_id.clone(), session.clone());
        info!("Created Gemini session.");
        Self {
            registry,
            client_id,
            session,
            released: false,
        }
    }

    async fn teardown(mut self) {
        info!("Cleaning up connection.");
        self.session.close().await;
        self.registry.remove_if_same(&self.client_id, &self.session);
        self.released = true;
        info!("Removed Gemini session.");
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.released {
            warn!("Session task ended without teardown; removing registry entry.");
            self.registry.remove_if_same(&self.client_id, &self.session);
        }
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg<S>(socket_tx: &mut S, msg: &ServerMessage) -> Result<(), RelayError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let serialized = serde_json::to_string(msg)?;
    socket_tx
        .send(Message::Text(serialized.into()))
        .await
        .map_err(|e| RelayError::ClientTransport(e.to_string()))
}

/// Best-effort close frame; the client may already be gone.
async fn close_with<S>(socket_tx: &mut S, code: u16, reason: impl Into<String>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let frame = CloseFrame {
        code,
        reason: truncate_reason(reason.into()).into(),
    };
    if let Err(e) = socket_tx.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Could not send close frame.");
    }
}

fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON_LEN {
        let mut end = MAX_CLOSE_REASON_LEN;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}
