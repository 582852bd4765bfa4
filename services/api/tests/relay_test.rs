//! End-to-end tests: the real router on an ephemeral port, a mock Gemini
//! endpoint, and a WebSocket client playing the browser.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, accept_async, connect_async,
    tungstenite::{Message, protocol::CloseFrame},
};
use tracing::Level;
use voice_relay_api::{config::Config, router::create_router, state::AppState};

const WAIT: Duration = Duration::from_secs(5);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single-connection stand-in for the Gemini Live endpoint.
struct MockGemini {
    endpoint: String,
    connections: Arc<AtomicUsize>,
    /// JSON frames the relay sent to Gemini.
    received: mpsc::UnboundedReceiver<Value>,
    /// Frames to push to the relay. Dropping it closes the connection.
    outgoing: Option<mpsc::UnboundedSender<Message>>,
}

impl MockGemini {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let (received_tx, received) = mpsc::unbounded_channel();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

        let counter = connections.clone();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut ws = accept_async(stream).await.unwrap();
            loop {
                tokio::select! {
                    frame = ws.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let value = serde_json::from_str(text.as_str()).unwrap();
                            let _ = received_tx.send(value);
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    out = outgoing_rx.recv() => match out {
                        Some(msg) => {
                            if ws.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = ws.close(None).await;
                            break;
                        }
                    },
                }
            }
        });

        Self {
            endpoint: format!("ws://{addr}/ws"),
            connections,
            received,
            outgoing: Some(outgoing),
        }
    }

    fn send(&self, value: Value) {
        self.outgoing
            .as_ref()
            .unwrap()
            .send(Message::Text(value.to_string().into()))
            .unwrap();
    }

    fn close(&mut self) {
        self.outgoing.take();
    }

    async fn next(&mut self) -> Value {
        timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for the relay")
            .expect("mock connection ended")
    }

    /// Asserts the relay sends nothing for `quiet`.
    async fn assert_silent(&mut self, quiet: Duration) {
        if let Ok(frame) = timeout(quiet, self.received.recv()).await {
            panic!("unexpected frame from the relay: {frame:?}");
        }
    }

    /// Accepts the relay's setup and acknowledges it.
    async fn complete_setup(&mut self) -> Value {
        let setup = self.next().await;
        self.send(json!({ "setupComplete": {} }));
        setup
    }
}

async fn spawn_relay(endpoint: &str) -> (SocketAddr, Arc<AppState>) {
    let config = Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        gemini_api_key: "test-key".to_string(),
        gemini_model: "test-model".to_string(),
        gemini_endpoint: endpoint.to_string(),
        log_level: Level::INFO,
    };
    let state = Arc::new(AppState::new(config));
    let app = create_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect_client(addr: SocketAddr, client_id: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws/{client_id}"))
        .await
        .unwrap();
    client
}

async fn send_json(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

fn config_message() -> Value {
    json!({ "type": "config", "config": { "voice": "Puck", "systemPrompt": "You are a tutor." } })
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for the relay")
            .expect("client stream ended")
            .unwrap();
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Close(frame) => panic!("unexpected close: {frame:?}"),
            _ => {}
        }
    }
}

/// Reads until the relay closes the connection and returns its close frame.
async fn next_close(client: &mut Client) -> Option<CloseFrame> {
    loop {
        let frame = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for close");
        match frame {
            Some(Ok(Message::Close(frame))) => return frame,
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return None,
        }
    }
}

async fn wait_until_unregistered(state: &AppState, client_id: &str) {
    timeout(WAIT, async {
        while state.registry.contains(client_id) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("registry entry was not removed");
}

#[tokio::test]
async fn test_liveness_endpoint() {
    let (addr, _state) = spawn_relay("ws://127.0.0.1:1/unused").await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#"{"message":"Voice Service API is running"}"#));
}

#[tokio::test]
async fn test_full_relay_round_trip() {
    let mut gemini = MockGemini::start().await;
    let (addr, state) = spawn_relay(&gemini.endpoint).await;
    let mut client = connect_client(addr, "client-1").await;

    send_json(&mut client, config_message()).await;
    let setup = gemini.complete_setup().await;
    assert_eq!(setup["setup"]["model"], "models/test-model");
    assert_eq!(
        setup["setup"]["generation_config"]["speech_config"]["voice_config"]
            ["prebuilt_voice_config"]["voice_name"],
        "Puck"
    );
    assert_eq!(
        setup["setup"]["system_instruction"]["parts"][0]["text"],
        "You are a tutor."
    );
    assert!(state.registry.contains("client-1"));

    send_json(&mut client, json!({ "type": "text", "data": "hello" })).await;
    let turn = gemini.next().await;
    assert_eq!(
        turn["client_content"]["turns"][0],
        json!({ "role": "user", "parts": [{ "text": "hello" }] })
    );
    assert_eq!(turn["client_content"]["turn_complete"], json!(true));

    send_json(&mut client, json!({ "type": "audio", "data": "AAAA" })).await;
    let audio = gemini.next().await;
    assert_eq!(
        audio["realtime_input"]["media_chunks"][0],
        json!({ "data": "AAAA", "mime_type": "audio/pcm" })
    );

    gemini.send(json!({
        "serverContent": { "modelTurn": { "parts": [{ "text": "hi" }] }, "turnComplete": true }
    }));
    assert_eq!(next_json(&mut client).await, json!({ "type": "text", "text": "hi" }));
    assert_eq!(
        next_json(&mut client).await,
        json!({ "type": "turn_complete", "data": true })
    );

    client.close(None).await.unwrap();
    wait_until_unregistered(&state, "client-1").await;
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn test_media_waits_for_setup_acknowledgement() {
    let mut gemini = MockGemini::start().await;
    let (addr, state) = spawn_relay(&gemini.endpoint).await;
    let mut client = connect_client(addr, "client-7").await;

    send_json(&mut client, config_message()).await;
    send_json(&mut client, json!({ "type": "audio", "data": "AAAA" })).await;

    let setup = gemini.next().await;
    assert!(setup.get("setup").is_some());
    gemini.assert_silent(Duration::from_millis(300)).await;

    gemini.send(json!({ "setupComplete": {} }));
    let audio = gemini.next().await;
    assert_eq!(
        audio["realtime_input"]["media_chunks"][0],
        json!({ "data": "AAAA", "mime_type": "audio/pcm" })
    );

    client.close(None).await.unwrap();
    wait_until_unregistered(&state, "client-7").await;
}

#[tokio::test]
async fn test_non_config_first_message_is_policy_violation() {
    let gemini = MockGemini::start().await;
    let (addr, state) = spawn_relay(&gemini.endpoint).await;
    let mut client = connect_client(addr, "client-2").await;

    send_json(&mut client, json!({ "type": "text", "data": "hello" })).await;

    let frame = next_close(&mut client).await.expect("close frame");
    assert_eq!(u16::from(frame.code), 1008);
    assert_eq!(frame.reason.as_str(), "First message must be configuration");

    wait_until_unregistered(&state, "client-2").await;
    assert_eq!(gemini.connections.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_upstream_closes_with_server_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap();
    drop(listener);

    let (addr, state) = spawn_relay(&format!("ws://{dead_addr}/ws")).await;
    let mut client = connect_client(addr, "client-3").await;

    send_json(&mut client, config_message()).await;

    let frame = next_close(&mut client).await.expect("close frame");
    assert_eq!(u16::from(frame.code), 1011);
    assert!(frame.reason.as_str().starts_with("Server error"));
    wait_until_unregistered(&state, "client-3").await;
}

#[tokio::test]
async fn test_malformed_client_messages_do_not_reach_gemini() {
    let mut gemini = MockGemini::start().await;
    let (addr, state) = spawn_relay(&gemini.endpoint).await;
    let mut client = connect_client(addr, "client-4").await;

    send_json(&mut client, config_message()).await;
    gemini.complete_setup().await;

    send_json(&mut client, json!({ "type": "audio" })).await;
    send_json(&mut client, json!({ "type": "hologram", "data": "x" })).await;
    client
        .send(Message::Binary(vec![0u8, 1, 2].into()))
        .await
        .unwrap();
    send_json(&mut client, json!({ "type": "image", "data": "/9j/" })).await;

    let first = gemini.next().await;
    assert_eq!(
        first["realtime_input"]["media_chunks"][0]["mime_type"],
        "image/jpeg"
    );
    assert!(state.registry.contains("client-4"));

    client.close(None).await.unwrap();
    wait_until_unregistered(&state, "client-4").await;
}

#[tokio::test]
async fn test_gemini_error_is_forwarded_and_session_continues() {
    let mut gemini = MockGemini::start().await;
    let (addr, state) = spawn_relay(&gemini.endpoint).await;
    let mut client = connect_client(addr, "client-5").await;

    send_json(&mut client, config_message()).await;
    gemini.complete_setup().await;

    gemini.send(json!({ "error": { "message": "quota exceeded" } }));
    assert_eq!(
        next_json(&mut client).await,
        json!({ "type": "error", "message": "quota exceeded" })
    );

    gemini.send(json!({
        "serverContent": { "modelTurn": { "parts": [{ "inlineData": { "data": "UklG" } }] } }
    }));
    assert_eq!(
        next_json(&mut client).await,
        json!({ "type": "audio", "data": "UklG" })
    );
    assert!(state.registry.contains("client-5"));

    client.close(None).await.unwrap();
    wait_until_unregistered(&state, "client-5").await;
}

#[tokio::test]
async fn test_upstream_close_ends_session() {
    let mut gemini = MockGemini::start().await;
    let (addr, state) = spawn_relay(&gemini.endpoint).await;
    let mut client = connect_client(addr, "client-6").await;

    send_json(&mut client, config_message()).await;
    gemini.complete_setup().await;
    // Make sure the relay is past the handshake before Gemini hangs up.
    send_json(&mut client, json!({ "type": "text", "data": "ping" })).await;
    gemini.next().await;

    gemini.close();

    let frame = next_close(&mut client).await.expect("close frame");
    assert_eq!(u16::from(frame.code), 1000);
    wait_until_unregistered(&state, "client-6").await;
}
