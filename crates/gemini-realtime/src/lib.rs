//! Client for the Gemini Live (`BidiGenerateContent`) streaming endpoint.
//!
//! The crate owns one thing: a [`GeminiSession`], the connection to the
//! provider for a single relayed conversation. It performs the setup
//! handshake and exposes send primitives for audio, image and text plus a raw
//! `receive` for the provider's responses. The wire shapes live in [`types`].

pub mod error;
pub mod session;
pub mod types;

pub use error::GeminiError;
pub use session::{DEFAULT_ENDPOINT, DEFAULT_MODEL, GeminiSession, SessionConfig};
