//! Observer presence tracking.
//!
//! Heartbeats refresh an in-memory last-seen registry; classification is
//! lazy time-delta evaluation at read time against two decay thresholds,
//! so there is no per-observer sweep task. The only timers are the
//! disconnect grace timers: one per observer, cancelled by reconnect via a
//! generation counter rather than by juggling timer handles.
//!
//! The registry is not persisted. On process restart every observer
//! re-heartbeats on reconnect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::config::PresenceConfig;
use crate::live::events::{LiveEvent, PresenceState, Topic};
use crate::live::router::EventRouter;

/// Heartbeat age below which an observer is `Online`.
pub const DEFAULT_ONLINE_WITHIN_SECS: i64 = 300;
/// Heartbeat age below which an observer is `Away` (and above online).
pub const DEFAULT_AWAY_WITHIN_SECS: i64 = 1800;
/// Disconnect debounce before an offline transition is announced.
pub const DEFAULT_DISCONNECT_GRACE_SECS: u64 = 30;

struct PresenceEntry {
    last_seen_at: DateTime<Utc>,
    /// Bumped on every heartbeat and disconnect; a pending grace timer
    /// fires only if its snapshot still matches.
    generation: u64,
}

/// Shared heartbeat registry with three-state liveness classification.
pub struct PresenceTracker {
    router: Arc<EventRouter>,
    entries: Mutex<HashMap<String, PresenceEntry>>,
    online_within: Duration,
    away_within: Duration,
    disconnect_grace: std::time::Duration,
}

impl PresenceTracker {
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self::with_thresholds(
            router,
            Duration::seconds(DEFAULT_ONLINE_WITHIN_SECS),
            Duration::seconds(DEFAULT_AWAY_WITHIN_SECS),
            std::time::Duration::from_secs(DEFAULT_DISCONNECT_GRACE_SECS),
        )
    }

    pub fn from_config(router: Arc<EventRouter>, config: &PresenceConfig) -> Self {
        Self::with_thresholds(
            router,
            Duration::seconds(config.online_within_secs),
            Duration::seconds(config.away_within_secs),
            std::time::Duration::from_secs(config.disconnect_grace_secs),
        )
    }

    pub fn with_thresholds(
        router: Arc<EventRouter>,
        online_within: Duration,
        away_within: Duration,
        disconnect_grace: std::time::Duration,
    ) -> Self {
        Self {
            router,
            entries: Mutex::new(HashMap::new()),
            online_within,
            away_within,
            disconnect_grace,
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<String, PresenceEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn classify_entry(&self, entry: Option<&PresenceEntry>, now: DateTime<Utc>) -> PresenceState {
        let Some(entry) = entry else {
            return PresenceState::Offline;
        };
        let elapsed = now - entry.last_seen_at;
        if elapsed < self.online_within {
            PresenceState::Online
        } else if elapsed < self.away_within {
            PresenceState::Away
        } else {
            PresenceState::Offline
        }
    }

    /// Record a heartbeat. Cancels any pending disconnect grace timer for
    /// this observer. An observer previously classified offline gets an
    /// immediate `presence_changed(online)` broadcast so peers converge
    /// without waiting for a poll.
    pub fn heartbeat(&self, observer_id: &str, now: DateTime<Utc>) {
        let was_offline = {
            let mut registry = self.registry();
            let previous = self.classify_entry(registry.get(observer_id), now);
            let entry = registry
                .entry(observer_id.to_string())
                .or_insert(PresenceEntry { last_seen_at: now, generation: 0 });
            entry.last_seen_at = now;
            entry.generation += 1;
            previous == PresenceState::Offline
        };
        if was_offline {
            info!(observer_id, "observer online");
            self.router.publish(
                &Topic::Global,
                &LiveEvent::PresenceChanged {
                    observer_id: observer_id.to_string(),
                    state: PresenceState::Online,
                },
            );
        }
    }

    /// Classify an observer's liveness at `now`. Unknown observers are
    /// offline.
    pub fn classify(&self, observer_id: &str, now: DateTime<Utc>) -> PresenceState {
        self.classify_entry(self.registry().get(observer_id), now)
    }

    /// Handle a connection-layer disconnect. Starts the grace timer; if no
    /// heartbeat arrives before it fires, an offline transition is
    /// broadcast. Quick reconnects therefore never flap.
    pub fn on_disconnect(self: &Arc<Self>, observer_id: &str) {
        let snapshot = {
            let mut registry = self.registry();
            let Some(entry) = registry.get_mut(observer_id) else {
                return;
            };
            entry.generation += 1;
            entry.generation
        };
        let tracker = Arc::clone(self);
        let observer_id = observer_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(tracker.disconnect_grace).await;
            let still_gone = tracker
                .registry()
                .get(&observer_id)
                .is_some_and(|entry| entry.generation == snapshot);
            if still_gone {
                debug!(observer_id, "grace elapsed, announcing offline");
                tracker.router.publish(
                    &Topic::Global,
                    &LiveEvent::PresenceChanged {
                        observer_id: observer_id.clone(),
                        state: PresenceState::Offline,
                    },
                );
            }
        });
    }

    /// Drop entries that have decayed to offline. Purely opportunistic;
    /// an absent entry classifies identically to a decayed one.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut registry = self.registry();
        let before = registry.len();
        registry.retain(|_, entry| now - entry.last_seen_at < self.away_within);
        before - registry.len()
    }
}
