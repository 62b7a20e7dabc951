//! Topic-keyed event routing to live connections.
//!
//! An [`EventRouter`] instance is injected into every component that
//! publishes; there is no ambient global. Delivery is best-effort to the
//! connections subscribed at publish time; disconnected observers reconcile
//! through the durable notification log on their next fetch.
//!
//! The registry lock is a `std::sync::Mutex`: every critical section is a
//! map operation plus non-blocking `send` calls, never an await.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::live::events::{LiveEvent, Topic};

/// Opaque handle identifying one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

type Subscribers = HashMap<ConnectionId, mpsc::UnboundedSender<LiveEvent>>;

/// Subscription registry plus fan-out.
#[derive(Default)]
pub struct EventRouter {
    topics: Mutex<HashMap<Topic, Subscribers>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<Topic, Subscribers>> {
        match self.topics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Subscribe a connection to a topic. Idempotent; re-subscribing
    /// replaces the stored sender.
    pub fn subscribe(
        &self,
        topic: Topic,
        connection: ConnectionId,
        sender: mpsc::UnboundedSender<LiveEvent>,
    ) {
        trace!(%topic, %connection, "subscribe");
        self.registry().entry(topic).or_default().insert(connection, sender);
    }

    /// Remove a connection from one topic. Idempotent.
    pub fn unsubscribe(&self, topic: &Topic, connection: ConnectionId) {
        let mut registry = self.registry();
        if let Some(subscribers) = registry.get_mut(topic) {
            subscribers.remove(&connection);
            if subscribers.is_empty() {
                registry.remove(topic);
            }
        }
    }

    /// Remove a connection from every topic it joined.
    pub fn disconnect(&self, connection: ConnectionId) {
        let mut registry = self.registry();
        registry.retain(|_, subscribers| {
            subscribers.remove(&connection);
            !subscribers.is_empty()
        });
    }

    /// Deliver an event to every connection currently subscribed to the
    /// topic. Returns the number of live deliveries; zero subscribers is a
    /// no-op. Connections whose receiver is gone are pruned.
    pub fn publish(&self, topic: &Topic, event: &LiveEvent) -> usize {
        let mut registry = self.registry();
        let Some(subscribers) = registry.get_mut(topic) else {
            return 0;
        };
        let mut delivered = 0;
        subscribers.retain(|connection, sender| {
            if sender.send(event.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                debug!(%topic, %connection, "pruning dead subscriber");
                false
            }
        });
        if subscribers.is_empty() {
            registry.remove(topic);
        }
        delivered
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.registry().get(topic).map_or(0, HashMap::len)
    }
}
