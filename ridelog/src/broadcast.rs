//! Snapshot fan-out to live observers.
//!
//! A [`Broadcaster`] keeps a registry of subscriber channels. Whenever the
//! record store commits a change it re-runs the canonical query for its record
//! kind and pushes the complete result to every subscriber. Subscribers never
//! see diffs, only full replacements.
//!
//! Registration delivers the current snapshot right away. Dropping a
//! [`Subscription`] removes its slot from the registry; channels found closed
//! during a broadcast are pruned as well.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use log::{debug, warn};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::persistence::{BikeEntity, ChangeListener, RecordStore, RideEntity, StoreChange};

/// A full, shared result set.
pub type Snapshot<E> = Arc<Vec<E>>;

/// Record kinds that can be broadcast, with their canonical fetch-all query.
pub trait SnapshotQuery: Sized + Send + Sync + 'static {
    /// Listener key used when attaching to the store.
    const KEY: &'static str;

    fn fetch_snapshot(store: &RecordStore) -> Result<Vec<Self>>;
}

impl SnapshotQuery for BikeEntity {
    const KEY: &'static str = "bikes";

    fn fetch_snapshot(store: &RecordStore) -> Result<Vec<Self>> {
        store.fetch_all_bikes()
    }
}

impl SnapshotQuery for RideEntity {
    const KEY: &'static str = "rides";

    fn fetch_snapshot(store: &RecordStore) -> Result<Vec<Self>> {
        store.fetch_all_rides()
    }
}

// ============================================================================
// Registry
// ============================================================================

type SubscriberId = u64;

struct Registry<E> {
    next_id: SubscriberId,
    subscribers: HashMap<SubscriberId, mpsc::UnboundedSender<Snapshot<E>>>,
}

fn lock<E>(registry: &Mutex<Registry<E>>) -> MutexGuard<'_, Registry<E>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Broadcaster
// ============================================================================

pub struct Broadcaster<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: SnapshotQuery> Broadcaster<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                subscribers: HashMap::new(),
            })),
        }
    }

    /// Register a subscriber and hand it the current snapshot.
    ///
    /// Must be called with the store lock held so no mutation can slip in
    /// between the initial read and the registration.
    pub fn subscribe(&self, store: &RecordStore) -> Subscription<E> {
        let (sender, receiver) = mpsc::unbounded_channel();

        match E::fetch_snapshot(store) {
            Ok(records) => {
                // Receiver is alive, so this cannot fail
                let _ = sender.send(Arc::new(records));
            }
            Err(e) => warn!(
                "[Broadcaster:{}] Initial snapshot skipped: {}",
                E::KEY,
                e
            ),
        }

        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.subscribers.insert(id, sender);
            debug!(
                "[Broadcaster:{}] Subscriber {} registered ({} active)",
                E::KEY,
                id,
                registry.subscribers.len()
            );
            id
        };

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Re-run the canonical query and deliver the result to every subscriber.
    ///
    /// A failed read is logged and skipped; subscribers keep the previous
    /// snapshot.
    pub fn refresh(&self, store: &RecordStore) {
        if self.subscriber_count() == 0 {
            return;
        }
        match E::fetch_snapshot(store) {
            Ok(records) => self.publish(Arc::new(records)),
            Err(e) => warn!("[Broadcaster:{}] Refresh skipped: {}", E::KEY, e),
        }
    }

    /// Push `snapshot` to every registered subscriber, pruning closed ones.
    pub fn publish(&self, snapshot: Snapshot<E>) {
        let mut registry = lock(&self.registry);
        registry
            .subscribers
            .retain(|_, sender| sender.send(Arc::clone(&snapshot)).is_ok());
        debug!(
            "[Broadcaster:{}] Published {} records to {} subscribers",
            E::KEY,
            snapshot.len(),
            registry.subscribers.len()
        );
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }
}

impl<E: SnapshotQuery> Default for Broadcaster<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SnapshotQuery> ChangeListener for Broadcaster<E> {
    fn on_change(&self, store: &RecordStore, _change: &StoreChange) {
        // Bike snapshots embed rides and ride snapshots embed bike names, so
        // every change refreshes every kind.
        self.refresh(store);
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Live stream of snapshots. Deregisters itself when dropped.
pub struct Subscription<E> {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<Snapshot<E>>,
    registry: Weak<Mutex<Registry<E>>>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<E> Stream for Subscription<E> {
    type Item = Snapshot<E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = lock(&registry);
            registry.subscribers.remove(&self.id);
            debug!(
                "[Broadcaster] Subscriber {} dropped ({} active)",
                self.id,
                registry.subscribers.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use futures::{FutureExt, StreamExt};
    use std::sync::atomic::{AtomicBool, Ordering};

    static READS_FAIL: AtomicBool = AtomicBool::new(false);

    /// Bike ids read through a query that can be made to fail.
    #[derive(Debug)]
    struct FlakyBikeId(String);

    impl SnapshotQuery for FlakyBikeId {
        const KEY: &'static str = "flaky_bikes";

        fn fetch_snapshot(store: &RecordStore) -> Result<Vec<Self>> {
            if READS_FAIL.load(Ordering::SeqCst) {
                return Err(StoreError::Internal {
                    message: "read refused".to_string(),
                });
            }
            Ok(store
                .fetch_all_bikes()?
                .into_iter()
                .map(|b| FlakyBikeId(b.id))
                .collect())
        }
    }

    fn bike(id: &str) -> BikeEntity {
        BikeEntity {
            id: id.to_string(),
            bike_type: 2,
            name: id.to_uppercase(),
            color: "bikeRed".to_string(),
            wheel_size: 1,
            service_due_km: 500.0,
            is_default: false,
            latest_service: None,
            rides: Vec::new(),
        }
    }

    fn ids(snapshot: &Snapshot<BikeEntity>) -> Vec<String> {
        snapshot.iter().map(|b| b.id.clone()).collect()
    }

    #[test]
    fn test_subscribe_delivers_initial_snapshot() {
        let mut store = RecordStore::in_memory().unwrap();
        store.add_bike(&bike("a")).unwrap();

        let broadcaster = Broadcaster::<BikeEntity>::new();
        let mut sub = broadcaster.subscribe(&store);

        let first = sub.next().now_or_never().flatten().unwrap();
        assert_eq!(ids(&first), vec!["a"]);
        assert!(sub.next().now_or_never().is_none());
    }

    #[test]
    fn test_changes_fan_out_to_all_subscribers() {
        let mut store = RecordStore::in_memory().unwrap();
        let broadcaster = Arc::new(Broadcaster::<BikeEntity>::new());
        store.add_listener(BikeEntity::KEY, broadcaster.clone());

        let mut one = broadcaster.subscribe(&store);
        let mut two = broadcaster.subscribe(&store);
        assert_eq!(broadcaster.subscriber_count(), 2);

        store.add_bike(&bike("a")).unwrap();

        for sub in [&mut one, &mut two] {
            let initial = sub.next().now_or_never().flatten().unwrap();
            assert!(initial.is_empty());
            let updated = sub.next().now_or_never().flatten().unwrap();
            assert_eq!(ids(&updated), vec!["a"]);
        }
    }

    #[test]
    fn test_dropped_subscription_deregisters() {
        let mut store = RecordStore::in_memory().unwrap();
        let broadcaster = Arc::new(Broadcaster::<BikeEntity>::new());
        store.add_listener(BikeEntity::KEY, broadcaster.clone());

        let kept = broadcaster.subscribe(&store);
        let dropped = broadcaster.subscribe(&store);
        drop(dropped);
        assert_eq!(broadcaster.subscriber_count(), 1);

        store.add_bike(&bike("a")).unwrap();
        drop(kept);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_closed_channels_are_pruned_on_publish() {
        let broadcaster = Broadcaster::<BikeEntity>::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&broadcaster.registry).subscribers.insert(99, sender);
        drop(receiver);
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.publish(Arc::new(Vec::new()));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_stream_ends_when_broadcaster_is_gone() {
        let store = RecordStore::in_memory().unwrap();
        let broadcaster = Broadcaster::<BikeEntity>::new();
        let mut sub = broadcaster.subscribe(&store);
        drop(broadcaster);

        assert!(sub.next().now_or_never().flatten().is_some());
        assert_eq!(sub.next().now_or_never(), Some(None));
    }

    #[test]
    fn test_failed_refresh_keeps_subscription_open() {
        let mut store = RecordStore::in_memory().unwrap();
        let broadcaster = Arc::new(Broadcaster::<FlakyBikeId>::new());
        store.add_listener(FlakyBikeId::KEY, broadcaster.clone());

        let mut sub = broadcaster.subscribe(&store);
        assert!(sub.next().now_or_never().flatten().unwrap().is_empty());

        READS_FAIL.store(true, Ordering::SeqCst);
        store.add_bike(&bike("a")).unwrap();
        READS_FAIL.store(false, Ordering::SeqCst);

        // Nothing delivered, still registered
        assert!(sub.next().now_or_never().is_none());
        assert_eq!(broadcaster.subscriber_count(), 1);

        store.add_bike(&bike("b")).unwrap();
        let recovered = sub.next().now_or_never().flatten().unwrap();
        let mut ids: Vec<_> = recovered.iter().map(|b| b.0.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
