use sotto_common::room::RoomId;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Rooms a session has unlocked.
///
/// Keyed by session id rather than user id, so an unlock on one device
/// never carries over to the user's other sessions. Entries live for the
/// lifetime of the session; `end_session` clears them when the session
/// is torn down.
#[derive(Debug, Clone, Default)]
pub struct SessionUnlockStore {
    unlocked: Arc<RwLock<HashMap<Uuid, HashSet<RoomId>>>>,
}

impl SessionUnlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_unlocked(&self, session_id: Uuid, room: RoomId) {
        self.unlocked.write().await.entry(session_id).or_default().insert(room);
    }

    pub async fn has_unlocked(&self, session_id: Uuid, room: RoomId) -> bool {
        self.unlocked
            .read()
            .await
            .get(&session_id)
            .is_some_and(|rooms| rooms.contains(&room))
    }

    pub async fn end_session(&self, session_id: Uuid) {
        self.unlocked.write().await.remove(&session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unlocks_are_scoped_to_the_session() {
        let store = SessionUnlockStore::new();
        let session = Uuid::new_v4();
        let other_session = Uuid::new_v4();
        let room = RoomId::topic(1);

        store.add_unlocked(session, room).await;

        assert!(store.has_unlocked(session, room).await);
        assert!(!store.has_unlocked(other_session, room).await);
        assert!(!store.has_unlocked(session, RoomId::topic(2)).await);
    }

    #[tokio::test]
    async fn ending_a_session_forgets_its_unlocks() {
        let store = SessionUnlockStore::new();
        let session = Uuid::new_v4();
        let room = RoomId::private(9);

        store.add_unlocked(session, room).await;
        store.end_session(session).await;

        assert!(!store.has_unlocked(session, room).await);
    }
}
