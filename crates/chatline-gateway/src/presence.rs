use std::collections::{HashMap, HashSet};

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use chatline_types::events::ServerEvent;

pub type ConnId = Uuid;

/// Outbound side of one realtime connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: ConnId,
    outbox: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh connection id and the receiver its transport drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        (
            Self {
                conn_id: Uuid::new_v4(),
                outbox,
            },
            rx,
        )
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    /// Queue an event. Returns false if the connection is already gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.outbox.send(event).is_ok()
    }
}

/// Process-local map of who is connected right now: user_id -> (conn_id -> handle).
///
/// A user may hold several sessions. Removal is keyed by connection id so a late
/// disconnect from an old session never evicts a newer one.
#[derive(Default)]
pub struct PresenceTracker {
    entries: RwLock<HashMap<Uuid, HashMap<ConnId, ConnectionHandle>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns true if this is the user's first live session.
    pub async fn set(&self, user_id: Uuid, handle: ConnectionHandle) -> bool {
        let mut entries = self.entries.write().await;
        let sessions = entries.entry(user_id).or_default();
        let first = sessions.is_empty();
        sessions.insert(handle.conn_id, handle);
        first
    }

    /// Drop one connection. Returns true if the user has no sessions left.
    /// Removing a connection that is not registered is a no-op and returns false.
    pub async fn remove(&self, user_id: Uuid, conn_id: ConnId) -> bool {
        let mut entries = self.entries.write().await;
        let Some(sessions) = entries.get_mut(&user_id) else {
            return false;
        };
        if sessions.remove(&conn_id).is_none() {
            return false;
        }
        if sessions.is_empty() {
            entries.remove(&user_id);
            return true;
        }
        false
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.entries.read().await.contains_key(&user_id)
    }

    pub async fn snapshot(&self) -> HashSet<Uuid> {
        self.entries.read().await.keys().copied().collect()
    }

    /// Handles for every session of the given users.
    pub async fn handles_for(&self, user_ids: &[Uuid]) -> Vec<ConnectionHandle> {
        let entries = self.entries.read().await;
        let unique: HashSet<&Uuid> = user_ids.iter().collect();
        unique
            .into_iter()
            .filter_map(|id| entries.get(id))
            .flat_map(|sessions| sessions.values().cloned())
            .collect()
    }

    pub async fn all_handles(&self) -> Vec<ConnectionHandle> {
        self.entries
            .read()
            .await
            .values()
            .flat_map(|sessions| sessions.values().cloned())
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.entries.read().await.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_remove() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        let (handle, _rx) = ConnectionHandle::new();
        let conn = handle.conn_id();

        assert!(!tracker.is_online(user).await);
        assert!(tracker.set(user, handle).await);
        assert!(tracker.is_online(user).await);
        assert_eq!(tracker.snapshot().await, HashSet::from([user]));

        assert!(tracker.remove(user, conn).await);
        assert!(!tracker.is_online(user).await);
        assert!(tracker.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn second_session_keeps_user_online() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        let (first, _rx1) = ConnectionHandle::new();
        let (second, _rx2) = ConnectionHandle::new();
        let first_id = first.conn_id();
        let second_id = second.conn_id();

        assert!(tracker.set(user, first).await);
        assert!(!tracker.set(user, second).await);
        assert_eq!(tracker.connection_count().await, 2);

        // Old session closing late must not take the new one down.
        assert!(!tracker.remove(user, first_id).await);
        assert!(tracker.is_online(user).await);

        assert!(tracker.remove(user, second_id).await);
        assert!(!tracker.is_online(user).await);
    }

    #[tokio::test]
    async fn removing_unknown_connection_is_noop() {
        let tracker = PresenceTracker::new();
        let user = Uuid::new_v4();
        let (handle, _rx) = ConnectionHandle::new();
        tracker.set(user, handle).await;

        assert!(!tracker.remove(user, Uuid::new_v4()).await);
        assert!(!tracker.remove(Uuid::new_v4(), Uuid::new_v4()).await);
        assert!(tracker.is_online(user).await);
    }

    #[tokio::test]
    async fn handles_for_deduplicates_users() {
        let tracker = PresenceTracker::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (ha, _ra) = ConnectionHandle::new();
        let (hb, _rb) = ConnectionHandle::new();
        tracker.set(a, ha).await;
        tracker.set(b, hb).await;

        assert_eq!(tracker.handles_for(&[a, a]).await.len(), 1);
        assert_eq!(tracker.handles_for(&[a, b, Uuid::new_v4()]).await.len(), 2);
        assert_eq!(tracker.all_handles().await.len(), 2);
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (handle, rx) = ConnectionHandle::new();
        assert!(handle.send(ServerEvent::Users(vec![])));
        drop(rx);
        assert!(!handle.send(ServerEvent::Users(vec![])));
    }
}
