//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the in-memory login-session
//! store backing the access gate.

use crate::config::Config;
use followup_core::ports::{DatabaseService, FollowupGenerationService};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all
/// handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub generator: Arc<dyn FollowupGenerationService>,
    pub config: Arc<Config>,
    pub sessions: SessionStore,
}

//=========================================================================================
// SessionStore (Process-Local Login Sessions)
//=========================================================================================

/// Caps the token set; with a single shared credential pair this is far
/// beyond any legitimate number of concurrent logins.
const MAX_SESSIONS: usize = 1024;

/// Holds the opaque tokens of currently logged-in sessions. Process-local
/// by design: the access gate is a single shared credential pair, not an
/// account system, so there is nothing durable to persist. Tokens leave
/// only on logout or restart; at capacity the whole set is dropped and
/// everyone logs in again.
#[derive(Clone, Default)]
pub struct SessionStore {
    tokens: Arc<Mutex<HashSet<String>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, token: String) {
        let mut tokens = self.tokens.lock().await;
        if tokens.len() >= MAX_SESSIONS {
            tokens.clear();
        }
        tokens.insert(token);
    }

    /// Removes a token; returns whether it was present.
    pub async fn remove(&self, token: &str) -> bool {
        self.tokens.lock().await.remove(token)
    }

    pub async fn contains(&self, token: &str) -> bool {
        self.tokens.lock().await.contains(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokens_live_until_removed() {
        let store = SessionStore::new();
        assert!(!store.contains("t1").await);

        store.insert("t1".to_string()).await;
        assert!(store.contains("t1").await);
        assert!(!store.contains("t2").await);

        assert!(store.remove("t1").await);
        assert!(!store.contains("t1").await);
        // Removing again is a no-op.
        assert!(!store.remove("t1").await);
    }

    #[tokio::test]
    async fn store_never_grows_past_the_session_cap() {
        let store = SessionStore::new();
        for i in 0..MAX_SESSIONS {
            store.insert(format!("t{i}")).await;
        }
        assert!(store.contains("t0").await);

        // The insert that would exceed the cap flushes the set first.
        store.insert("fresh".to_string()).await;
        assert!(store.contains("fresh").await);
        assert!(!store.contains("t0").await);
    }
}
