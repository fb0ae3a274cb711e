//! In-process fan-out broker.
//!
//! Each stream connection owns a bounded channel registered under its
//! room. Publishing encodes the event once, snapshots the room's senders
//! under the lock, then enqueues outside it with `try_send`; a full or
//! closed channel drops that delivery and never blocks the publisher.
//! There is no replay: a subscriber only sees events published while its
//! channel is registered.

use sotto_common::{event::StreamEvent, room::RoomId};
use std::{
    collections::HashMap,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::metrics;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

struct Subscriber {
    id: Uuid,
    sender: mpsc::Sender<String>,
}

/// Outcome of a single publish, per subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

pub struct SubscriberRegistry {
    // std Mutex so `SubscriberHandle::drop` can unsubscribe synchronously.
    // Held only for map edits and sender snapshots, never across an await.
    rooms: Mutex<HashMap<RoomId, Vec<Subscriber>>>,
    channel_capacity: usize,
}

impl SubscriberRegistry {
    pub fn new(channel_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            rooms: Mutex::new(HashMap::new()),
            channel_capacity: channel_capacity.max(1),
        })
    }

    /// Register a new subscriber on a room. The returned handle is the
    /// subscription; dropping it unregisters exactly once.
    pub fn subscribe(self: &Arc<Self>, room: RoomId) -> SubscriberHandle {
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        let id = Uuid::new_v4();

        self.rooms
            .lock()
            .expect("subscriber registry lock poisoned")
            .entry(room)
            .or_default()
            .push(Subscriber { id, sender });
        metrics::increment_active_subscribers();
        debug!(%room, subscriber_id = %id, "subscriber registered");

        SubscriberHandle { id, room, receiver, registry: Arc::clone(self) }
    }

    /// Remove a subscriber. Safe to call for an id that is already gone;
    /// the room's entry disappears with its last subscriber.
    fn unsubscribe(&self, room: RoomId, id: Uuid) {
        let mut rooms = self.rooms.lock().expect("subscriber registry lock poisoned");
        if let Some(subscribers) = rooms.get_mut(&room) {
            subscribers.retain(|subscriber| subscriber.id != id);
            if subscribers.is_empty() {
                rooms.remove(&room);
            }
        }
    }

    /// Fan an event out to every current subscriber of the room.
    pub fn publish(&self, room: RoomId, event: &StreamEvent) -> anyhow::Result<PublishOutcome> {
        let encoded = event.encode()?;
        Ok(self.publish_encoded(room, &encoded))
    }

    fn publish_encoded(&self, room: RoomId, encoded: &str) -> PublishOutcome {
        let senders: Vec<(Uuid, mpsc::Sender<String>)> = {
            let rooms = self.rooms.lock().expect("subscriber registry lock poisoned");
            rooms
                .get(&room)
                .map(|subscribers| {
                    subscribers
                        .iter()
                        .map(|subscriber| (subscriber.id, subscriber.sender.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut outcome = PublishOutcome::default();
        for (id, sender) in senders {
            match sender.try_send(encoded.to_owned()) {
                Ok(()) => outcome.delivered += 1,
                Err(error) => {
                    outcome.dropped += 1;
                    debug!(%room, subscriber_id = %id, %error, "dropped delivery");
                }
            }
        }

        metrics::record_publish(room.kind, outcome.delivered, outcome.dropped);
        outcome
    }

    pub fn subscriber_count(&self, room: RoomId) -> usize {
        self.rooms
            .lock()
            .expect("subscriber registry lock poisoned")
            .get(&room)
            .map_or(0, Vec::len)
    }
}

/// A live subscription. Yields wire-encoded events in publish order and
/// unregisters itself on drop.
pub struct SubscriberHandle {
    id: Uuid,
    room: RoomId,
    receiver: mpsc::Receiver<String>,
    registry: Arc<SubscriberRegistry>,
}

impl SubscriberHandle {
    pub fn room(&self) -> RoomId {
        self.room
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl futures_util::Stream for SubscriberHandle {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.room, self.id);
        metrics::decrement_active_subscribers();
        debug!(room = %self.room, subscriber_id = %self.id, "subscriber unregistered");
    }
}
