//! Observable session state
//!
//! One writer side, any number of watchers. Every mutation goes through
//! [`SessionStore::update`], so watchers never see a half-applied change.

use std::sync::Arc;

use bship_core::SessionState;
use chrono::Utc;
use tokio::sync::watch;

/// Shared handle to the live [`SessionState`]
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Read a part of the state without copying all of it
    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Receiver that is woken on every change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Apply a mutation atomically and notify watchers
    pub fn update(&self, f: impl FnOnce(&mut SessionState)) {
        self.tx.send_modify(f);
    }

    /// Record that a frame just arrived
    pub(crate) fn touch(&self) {
        self.tx
            .send_modify(|state| state.last_activity = Some(Utc::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bship_core::ConnectionStatus;

    #[tokio::test]
    async fn test_watchers_see_updates() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();

        store.update(|s| {
            s.connection = ConnectionStatus::Connected;
            s.room_code = "0420".to_string();
        });

        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.connection, ConnectionStatus::Connected);
        assert_eq!(seen.room_code, "0420");
        assert_eq!(store.snapshot(), seen);
    }

    #[test]
    fn test_touch_sets_last_activity() {
        let store = SessionStore::new();
        assert!(store.read(|s| s.last_activity.is_none()));
        store.touch();
        assert!(store.read(|s| s.last_activity.is_some()));
    }
}
