//! WebSocket Relay
//!
//! This module relays one browser client to one Gemini Live session:
//!
//! - `protocol`: the JSON envelopes exchanged with the browser.
//! - `session`: connection lifecycle, from handshake to teardown.
//! - `client_pump`: forwards client envelopes to Gemini.
//! - `upstream_pump`: forwards Gemini responses to the client.
//! - `upstream`: the trait the pumps use to talk to Gemini.

mod client_pump;
pub mod protocol;
pub mod session;
pub mod upstream;
mod upstream_pump;

pub use session::ws_handler;
