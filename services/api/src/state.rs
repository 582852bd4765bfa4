//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the configuration
//! and the session registry shared by all connection handlers.

use crate::{config::Config, registry::SessionRegistry};
use gemini_realtime::{GeminiError, GeminiSession};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
        }
    }

    /// Builds an unconnected Gemini session from the loaded configuration.
    pub fn new_gemini_session(&self) -> Result<GeminiSession, GeminiError> {
        Ok(GeminiSession::new(self.config.gemini_api_key.clone())?
            .with_model(self.config.gemini_model.clone())
            .with_endpoint(self.config.gemini_endpoint.clone()))
    }
}
