//! Registry of live socket connections.
//!
//! Maps a user's link id to the sender half of its socket task. The
//! registry is an owned, cloneable handle passed to whoever needs it; there
//! is no global instance. An entry is removed when its socket closes, when
//! a newer connection for the same user replaces it, or when a send finds
//! the receiving task gone.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

/// A real-time event as sent over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

impl SocketEvent {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        SocketEvent {
            event: event.into(),
            payload,
        }
    }
}

pub type ConnectionHandle = mpsc::UnboundedSender<SocketEvent>;

#[derive(Debug)]
struct Connection {
    id: Uuid,
    handle: ConnectionHandle,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a user, replacing any older one. Returns
    /// the connection id to pass to `unregister_connection` on close.
    pub async fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> Uuid {
        let id = Uuid::new_v4();
        let previous = self
            .inner
            .write()
            .await
            .insert(user_id, Connection { id, handle });
        if previous.is_some() {
            debug!(user = %user_id, "replaced existing socket connection");
        }
        id
    }

    pub async fn unregister(&self, user_id: Uuid) -> bool {
        self.inner.write().await.remove(&user_id).is_some()
    }

    /// Remove the user's entry only if it is still `connection_id`, so a
    /// late close of a replaced socket cannot drop its successor.
    pub async fn unregister_connection(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let mut connections = self.inner.write().await;
        match connections.get(&user_id) {
            Some(conn) if conn.id == connection_id => {
                connections.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.inner
            .read()
            .await
            .get(&user_id)
            .map(|conn| conn.handle.clone())
    }

    pub async fn is_connected(&self, user_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    pub async fn connected(&self) -> Vec<Uuid> {
        self.inner.read().await.keys().copied().collect()
    }

    /// Send to one user. Returns `false` if the user is offline; a closed
    /// handle is evicted.
    pub async fn emit(&self, user_id: Uuid, event: SocketEvent) -> bool {
        let Some(handle) = self.lookup(user_id).await else {
            return false;
        };
        if handle.send(event).is_ok() {
            return true;
        }

        let mut connections = self.inner.write().await;
        if connections
            .get(&user_id)
            .is_some_and(|conn| conn.handle.same_channel(&handle))
        {
            connections.remove(&user_id);
            debug!(user = %user_id, "evicted closed socket connection");
        }
        false
    }

    /// Send to every connected user, returning how many received it.
    pub async fn broadcast(&self, event: SocketEvent) -> usize {
        let mut delivered = 0;
        for user_id in self.connected().await {
            if self.emit(user_id, event.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> SocketEvent {
        SocketEvent::new("ping", json!({ "n": 1 }))
    }

    #[tokio::test]
    async fn register_lookup_unregister() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();

        registry.register(user, tx).await;
        assert!(registry.lookup(user).await.is_some());
        assert!(registry.unregister(user).await);
        assert!(registry.lookup(user).await.is_none());
        assert!(!registry.unregister(user).await);
    }

    #[tokio::test]
    async fn emit_reaches_registered_user() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(user, tx).await;

        assert!(registry.emit(user, event()).await);
        assert_eq!(rx.recv().await, Some(event()));
        assert!(!registry.emit(Uuid::new_v4(), event()).await);
    }

    #[tokio::test]
    async fn closed_connection_is_evicted_on_emit() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(user, tx).await;
        drop(rx);

        assert!(!registry.emit(user, event()).await);
        assert!(!registry.is_connected(user).await);
    }

    #[tokio::test]
    async fn stale_close_keeps_newer_connection() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, _new_rx) = mpsc::unbounded_channel();

        let old = registry.register(user, old_tx).await;
        let new = registry.register(user, new_tx).await;

        assert!(!registry.unregister_connection(user, old).await);
        assert!(registry.is_connected(user).await);
        assert!(registry.unregister_connection(user, new).await);
    }

    #[tokio::test]
    async fn broadcast_counts_live_connections() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        registry.register(Uuid::new_v4(), tx1).await;
        registry.register(Uuid::new_v4(), tx2).await;
        drop(rx2);

        assert_eq!(registry.broadcast(event()).await, 1);
        assert_eq!(registry.connected().await.len(), 1);
    }
}
