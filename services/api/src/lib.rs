//! Voice Relay API Library Crate
//!
//! This library contains the relay between browser clients and the Gemini
//! Live API: configuration, application state, the session registry, the
//! HTTP router and the WebSocket relay. The `api` binary is a thin wrapper
//! around it.

pub mod config;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod router;
pub mod state;
pub mod ws;
