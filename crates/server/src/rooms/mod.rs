// Room lock configuration and the access gate around it.
//
// The lock itself is an attribute of the room's owning entity (topic,
// relationship, or private chat) and is persisted outside this server;
// `LockStore` only reads it. The gate decision logic lives in `gate`.

pub mod gate;
pub mod unlocks;

use anyhow::Context;
use sotto_common::room::{RoomId, RoomKind};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// A room's lock configuration as read from the owning entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockConfig {
    pub is_locked: bool,
    /// Argon2id PHC string; absent for allow-list-only rooms.
    pub password_hash: Option<String>,
    /// Allow-listed user ids in decimal string form. Stored loosely typed
    /// upstream (JSON array of numbers or strings), so membership is
    /// compared as strings.
    pub allowed_user_ids: Vec<String>,
    /// Message shown on the lock prompt.
    pub lock_message: Option<String>,
}

impl LockConfig {
    pub fn unlocked() -> Self {
        Self::default()
    }
}

/// Source of lock configurations, selected at startup.
#[derive(Clone)]
pub enum LockStore {
    Postgres(sqlx::PgPool),
    Memory(Arc<RwLock<HashMap<RoomId, LockConfig>>>),
}

impl LockStore {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::Postgres(pool)
    }

    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    /// Read the lock configuration for a room.
    ///
    /// Returns `None` when the owning entity does not exist. The breaking
    /// feed has no owning row and is never locked.
    pub async fn get_lock_config(&self, room: RoomId) -> anyhow::Result<Option<LockConfig>> {
        if room.kind == RoomKind::Breaking {
            return Ok(Some(LockConfig::unlocked()));
        }

        match self {
            Self::Postgres(pool) => {
                let table = match room.kind {
                    RoomKind::Topic => "topics",
                    RoomKind::Relationship => "relationships",
                    RoomKind::Private => "private_chats",
                    RoomKind::Breaking => unreachable!("breaking handled above"),
                };
                let query = format!(
                    "SELECT COALESCE(is_locked, FALSE), lock_password, allowed_user_ids, \
                     lock_message FROM {table} WHERE id = $1"
                );

                let row = sqlx::query_as::<_, (bool, Option<String>, Option<String>, Option<String>)>(
                    &query,
                )
                .bind(room.target)
                .fetch_optional(pool)
                .await
                .with_context(|| format!("failed to read lock configuration for {room}"))?;

                Ok(row.map(|(is_locked, password_hash, allowed_raw, lock_message)| LockConfig {
                    is_locked,
                    password_hash,
                    allowed_user_ids: parse_allowed_user_ids(allowed_raw.as_deref()),
                    lock_message,
                }))
            }
            Self::Memory(store) => Ok(store.read().await.get(&room).cloned()),
        }
    }

    pub async fn set_for_tests(&self, room: RoomId, config: LockConfig) {
        if let Self::Memory(store) = self {
            store.write().await.insert(room, config);
        }
    }
}

/// Parse the loosely-typed allow-list column into decimal string ids.
/// Malformed JSON yields an empty list rather than an error; a broken
/// allow-list must not unlock the room for everyone.
fn parse_allowed_user_ids(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(entries)) => entries
            .into_iter()
            .map(|entry| match entry {
                serde_json::Value::String(id) => id,
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_id_representations_as_strings() {
        let ids = parse_allowed_user_ids(Some("[1, \"2\", 30]"));
        assert_eq!(ids, vec!["1", "2", "30"]);
    }

    #[test]
    fn malformed_allow_list_yields_empty() {
        assert!(parse_allowed_user_ids(Some("not json")).is_empty());
        assert!(parse_allowed_user_ids(Some("{\"a\": 1}")).is_empty());
        assert!(parse_allowed_user_ids(None).is_empty());
    }

    #[tokio::test]
    async fn breaking_feed_is_never_locked() {
        let store = LockStore::in_memory();
        let config = store
            .get_lock_config(RoomId::breaking())
            .await
            .expect("lookup should succeed")
            .expect("breaking room should exist");
        assert!(!config.is_locked);
    }

    #[tokio::test]
    async fn memory_store_returns_none_for_unknown_rooms() {
        let store = LockStore::in_memory();
        let config = store
            .get_lock_config(RoomId::topic(99))
            .await
            .expect("lookup should succeed");
        assert!(config.is_none());
    }

    #[tokio::test]
    async fn memory_store_round_trips_configs() {
        let store = LockStore::in_memory();
        let config = LockConfig {
            is_locked: true,
            password_hash: None,
            allowed_user_ids: vec!["5".to_owned()],
            lock_message: Some("members only".to_owned()),
        };
        store.set_for_tests(RoomId::topic(3), config.clone()).await;

        let found = store
            .get_lock_config(RoomId::topic(3))
            .await
            .expect("lookup should succeed")
            .expect("room should exist");
        assert_eq!(found, config);
    }
}
