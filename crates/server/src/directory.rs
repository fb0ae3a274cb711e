//! Read-only view of users and message authorship, used to compute the
//! active-participant counts shown on room listings.
//!
//! A user counts as active in a room when they either authored a message
//! there recently or have a recent presence heartbeat, and they are an
//! approved account that has authenticated within the window. The
//! breaking feed has no message table of its own, so it counts presence
//! alone.

use chrono::{DateTime, Duration, Utc};
use sotto_common::room::{RoomId, RoomKind};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::RwLock;

use crate::presence::PresenceStore;
use anyhow::Context;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub approved: bool,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryDirectory {
    users: HashMap<i64, UserRecord>,
    authors: HashMap<RoomId, Vec<(i64, DateTime<Utc>)>>,
}

#[derive(Clone)]
pub enum UserDirectory {
    Postgres(sqlx::PgPool),
    Memory(Arc<RwLock<MemoryDirectory>>),
}

impl UserDirectory {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::Postgres(pool)
    }

    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(MemoryDirectory::default())))
    }

    /// Number of users active in the room within the window.
    pub async fn active_count(
        &self,
        room: RoomId,
        presence: &PresenceStore,
        window: Duration,
    ) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - window;

        let mut candidates = presence.active_since(room, cutoff).await;
        candidates.extend(self.recent_message_authors(room, cutoff).await?);

        if candidates.is_empty() {
            return Ok(0);
        }

        Ok(self.filter_recently_authenticated(&candidates, cutoff).await?.len())
    }

    /// Users who authored a message in the room at or after the cutoff.
    async fn recent_message_authors(
        &self,
        room: RoomId,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<HashSet<i64>> {
        if room.kind == RoomKind::Breaking {
            return Ok(HashSet::new());
        }

        match self {
            Self::Postgres(pool) => {
                let (table, column) = match room.kind {
                    RoomKind::Topic => ("topic_messages", "topic_id"),
                    RoomKind::Relationship => ("relationship_messages", "relationship_id"),
                    RoomKind::Private => ("chat_messages", "chat_id"),
                    RoomKind::Breaking => unreachable!("breaking handled above"),
                };
                let query = format!(
                    "SELECT DISTINCT user_id FROM {table} WHERE {column} = $1 AND created_at >= $2"
                );

                let authors = sqlx::query_scalar::<_, i64>(&query)
                    .bind(room.target)
                    .bind(cutoff)
                    .fetch_all(pool)
                    .await
                    .with_context(|| format!("failed to read recent authors for {room}"))?;

                Ok(authors.into_iter().collect())
            }
            Self::Memory(store) => Ok(store
                .read()
                .await
                .authors
                .get(&room)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|(_, at)| *at >= cutoff)
                        .map(|(user_id, _)| *user_id)
                        .collect()
                })
                .unwrap_or_default()),
        }
    }

    /// Keep only approved users whose last login is at or after the cutoff.
    async fn filter_recently_authenticated(
        &self,
        user_ids: &HashSet<i64>,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<HashSet<i64>> {
        match self {
            Self::Postgres(pool) => {
                let ids: Vec<i64> = user_ids.iter().copied().collect();
                let active = sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM users WHERE id = ANY($1) AND status = 'approved' \
                     AND last_login >= $2",
                )
                .bind(&ids)
                .bind(cutoff)
                .fetch_all(pool)
                .await
                .context("failed to filter recently authenticated users")?;

                Ok(active.into_iter().collect())
            }
            Self::Memory(store) => {
                let store = store.read().await;
                Ok(user_ids
                    .iter()
                    .copied()
                    .filter(|user_id| {
                        store.users.get(user_id).is_some_and(|record| {
                            record.approved
                                && record.last_login.is_some_and(|at| at >= cutoff)
                        })
                    })
                    .collect())
            }
        }
    }

    pub async fn set_user_for_tests(&self, user_id: i64, record: UserRecord) {
        if let Self::Memory(store) = self {
            store.write().await.users.insert(user_id, record);
        }
    }

    pub async fn add_author_for_tests(&self, room: RoomId, user_id: i64, at: DateTime<Utc>) {
        if let Self::Memory(store) = self {
            store.write().await.authors.entry(room).or_default().push((user_id, at));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_user() -> UserRecord {
        UserRecord { approved: true, last_login: Some(Utc::now()) }
    }

    #[tokio::test]
    async fn counts_recent_authors_and_presence_once() {
        let directory = UserDirectory::in_memory();
        let presence = PresenceStore::in_memory();
        let room = RoomId::topic(1);
        let now = Utc::now();

        for user_id in [1, 2, 3] {
            directory.set_user_for_tests(user_id, active_user()).await;
        }
        directory.add_author_for_tests(room, 1, now).await;
        directory.add_author_for_tests(room, 2, now).await;
        presence.record(room, 2).await;
        presence.record(room, 3).await;

        let count = directory
            .active_count(room, &presence, Duration::minutes(5))
            .await
            .expect("count should succeed");
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn stale_authors_do_not_count() {
        let directory = UserDirectory::in_memory();
        let presence = PresenceStore::in_memory();
        let room = RoomId::topic(1);

        directory.set_user_for_tests(1, active_user()).await;
        directory.add_author_for_tests(room, 1, Utc::now() - Duration::hours(2)).await;

        let count = directory
            .active_count(room, &presence, Duration::minutes(5))
            .await
            .expect("count should succeed");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn unapproved_or_stale_logins_are_excluded() {
        let directory = UserDirectory::in_memory();
        let presence = PresenceStore::in_memory();
        let room = RoomId::relationship(4);
        let now = Utc::now();

        directory
            .set_user_for_tests(1, UserRecord { approved: false, last_login: Some(now) })
            .await;
        directory
            .set_user_for_tests(
                2,
                UserRecord { approved: true, last_login: Some(now - Duration::hours(1)) },
            )
            .await;
        directory
            .set_user_for_tests(3, UserRecord { approved: true, last_login: None })
            .await;
        for user_id in [1, 2, 3] {
            directory.add_author_for_tests(room, user_id, now).await;
        }

        let count = directory
            .active_count(room, &presence, Duration::minutes(5))
            .await
            .expect("count should succeed");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn breaking_feed_counts_presence_only() {
        let directory = UserDirectory::in_memory();
        let presence = PresenceStore::in_memory();
        let room = RoomId::breaking();

        directory.set_user_for_tests(1, active_user()).await;
        presence.record(room, 1).await;

        let count = directory
            .active_count(room, &presence, Duration::minutes(5))
            .await
            .expect("count should succeed");
        assert_eq!(count, 1);
    }
}
