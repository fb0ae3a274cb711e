//! Best-effort presence tracking.
//!
//! Presence is advisory: a heartbeat that fails to record must never fail
//! the request that carried it, and a read that fails reports an empty
//! room rather than an error. Redis is used when configured so presence
//! survives restarts and is shared across replicas; otherwise a
//! process-local map is used.

use chrono::{DateTime, TimeZone, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use sotto_common::room::RoomId;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::RwLock;
use tracing::warn;

use crate::metrics;

type MemoryPresence = Arc<RwLock<HashMap<RoomId, HashMap<i64, DateTime<Utc>>>>>;

#[derive(Clone)]
pub enum PresenceStore {
    Memory(MemoryPresence),
    Redis(ConnectionManager),
}

impl PresenceStore {
    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    pub async fn from_redis_url(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::Redis(manager))
    }

    /// Record that a user is present in a room right now.
    pub async fn record(&self, room: RoomId, user_id: i64) {
        self.record_at(room, user_id, Utc::now()).await;
    }

    pub(crate) async fn record_at(&self, room: RoomId, user_id: i64, seen_at: DateTime<Utc>) {
        match self {
            Self::Memory(store) => {
                store.write().await.entry(room).or_default().insert(user_id, seen_at);
            }
            Self::Redis(manager) => {
                let mut conn = manager.clone();
                let result: redis::RedisResult<()> = conn
                    .hset(presence_key(room), user_id, seen_at.timestamp())
                    .await;
                if let Err(error) = result {
                    warn!(%room, user_id, %error, "failed to record presence");
                    metrics::increment_presence_errors();
                }
            }
        }
    }

    /// Users seen in the room at or after the cutoff. The cutoff is
    /// inclusive; a heartbeat exactly at the boundary counts as active.
    pub async fn active_since(&self, room: RoomId, cutoff: DateTime<Utc>) -> HashSet<i64> {
        match self {
            Self::Memory(store) => store
                .read()
                .await
                .get(&room)
                .map(|seen| {
                    seen.iter()
                        .filter(|(_, at)| **at >= cutoff)
                        .map(|(user_id, _)| *user_id)
                        .collect()
                })
                .unwrap_or_default(),
            Self::Redis(manager) => {
                let mut conn = manager.clone();
                let entries: redis::RedisResult<HashMap<i64, i64>> =
                    conn.hgetall(presence_key(room)).await;
                match entries {
                    Ok(entries) => entries
                        .into_iter()
                        .filter(|(_, epoch)| {
                            Utc.timestamp_opt(*epoch, 0)
                                .single()
                                .is_some_and(|at| at >= cutoff)
                        })
                        .map(|(user_id, _)| user_id)
                        .collect(),
                    Err(error) => {
                        warn!(%room, %error, "failed to read presence");
                        metrics::increment_presence_errors();
                        HashSet::new()
                    }
                }
            }
        }
    }
}

fn presence_key(room: RoomId) -> String {
    format!("presence:{room}")
}
