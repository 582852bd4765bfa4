//! Session registry mapping client ids to their Gemini sessions.
//!
//! A session is inserted when its client connects and removed when the
//! session supervisor tears it down. The registry is owned by [`crate::state::AppState`]
//! and injected into each connection handler.

use dashmap::DashMap;
use gemini_realtime::GeminiSession;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry of active relay sessions. Cheap to clone.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<GeminiSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `session` under `client_id`, replacing any previous entry.
    pub fn insert(&self, client_id: impl Into<String>, session: Arc<GeminiSession>) {
        let client_id = client_id.into();
        if self.sessions.insert(client_id.clone(), session).is_some() {
            warn!(%client_id, "Client id reused; replaced existing session entry.");
        }
    }

    /// Removes the entry only if it still points at `session`.
    ///
    /// A client that reconnects with the same id replaces the entry; the old
    /// connection's teardown must not evict the new session.
    pub fn remove_if_same(&self, client_id: &str, session: &Arc<GeminiSession>) -> bool {
        let removed = self
            .sessions
            .remove_if(client_id, |_, current| Arc::ptr_eq(current, session))
            .is_some();
        debug!(%client_id, removed, "Registry cleanup.");
        removed
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.sessions.contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
