use crate::{HierarchyCache, InvalidationPropagator, ListenerId, UnitEventCollector};
use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use typegraph_core::{ChangeEvent, ChangeListener, DeltaListener, StoreDelta, UnitId};

/// Receives raw structural deltas from the declaration store, smooths
/// working-copy noise through per-unit collectors, and republishes
/// normalized change events: the invalidation propagator synchronously
/// first (so cache state is never observed stale by a subsequent listener),
/// then external subscribers in registration order.
///
/// Delivery happens on the store's own notification thread; the emitter
/// spawns nothing.
pub struct ChangeEventEmitter {
    cache: HierarchyCache,
    propagator: InvalidationPropagator,
    subscribers: RwLock<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
    next_subscriber: AtomicU64,
    senders: RwLock<Vec<Sender<ChangeEvent>>>,
    collectors: DashMap<UnitId, UnitEventCollector>,
}

impl ChangeEventEmitter {
    pub fn new(cache: HierarchyCache) -> Self {
        Self {
            propagator: InvalidationPropagator::new(cache.clone()),
            cache,
            subscribers: RwLock::new(Vec::new()),
            next_subscriber: AtomicU64::new(1),
            senders: RwLock::new(Vec::new()),
            collectors: DashMap::new(),
        }
    }

    /// Build the emitter for `cache` and register it with the cache's
    /// declaration store.
    pub fn attach(cache: &HierarchyCache) -> Arc<Self> {
        let emitter = Arc::new(Self::new(cache.clone()));
        cache.store().register_delta_listener(emitter.clone());
        emitter
    }

    pub fn add_change_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, listener));
        id
    }

    pub fn remove_change_listener(&self, id: ListenerId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(listener_id, _)| *listener_id != id);
        subscribers.len() != before
    }

    /// Channel-based subscription; disconnected receivers are dropped on
    /// the next send.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = unbounded();
        self.senders.write().push(tx);
        rx
    }

    /// Start collecting events for `unit`. Until the working copy is
    /// released, events for elements in this unit accumulate instead of
    /// firing.
    pub fn begin_working_copy(&self, unit: UnitId) {
        let baseline = self.cache.store().modification_stamp(&unit);
        self.collectors
            .entry(unit.clone())
            .or_insert_with(|| UnitEventCollector::new(unit, baseline));
    }

    pub fn is_working_copy(&self, unit: &UnitId) -> bool {
        self.collectors.contains_key(unit)
    }

    /// Release the working copy for `unit`. With `commit` set and a moved
    /// modification stamp the pending batch fires through the normal
    /// pipeline in first-touch order; an unchanged stamp (or a discard)
    /// drops the batch silently. `BufferSync` is emitted either way.
    pub fn release_working_copy(&self, unit: &UnitId, commit: bool) {
        let Some((_, mut collector)) = self.collectors.remove(unit) else {
            return;
        };
        let pending = collector.drain();
        let stamp_moved =
            self.cache.store().modification_stamp(unit) != collector.baseline_stamp();
        if commit && stamp_moved {
            for event in pending {
                self.fire(event);
            }
        } else if !pending.is_empty() {
            debug!(unit = %unit, dropped = pending.len(), "dropped pending working-copy events");
        }
        if self.cache.config().emit_buffer_events {
            self.notify_subscribers(&ChangeEvent::buffer_sync(unit.clone()));
        }
    }

    /// Recursive walk of the delta tree: composites recurse into their
    /// children, leaves route into the pipeline.
    fn walk(&self, delta: &StoreDelta) {
        if delta.is_composite() {
            for child in &delta.children {
                self.walk(child);
            }
            return;
        }
        self.route(delta.to_event());
    }

    fn route(&self, event: ChangeEvent) {
        let unit = event.element.owning_unit().clone();
        if let Some(mut collector) = self.collectors.get_mut(&unit) {
            let first = collector.add_event(event);
            drop(collector);
            if first && self.cache.config().emit_buffer_events {
                self.notify_subscribers(&ChangeEvent::buffer_dirty(unit));
            }
            return;
        }
        self.fire(event);
    }

    fn fire(&self, event: ChangeEvent) {
        self.propagator.on_change(&event);
        self.notify_subscribers(&event);
    }

    fn notify_subscribers(&self, event: &ChangeEvent) {
        let subscribers: Vec<_> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in subscribers {
            if let Err(e) = listener.on_change(event) {
                warn!(error = %e, "change listener failed");
            }
        }
        self.senders
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl DeltaListener for ChangeEventEmitter {
    fn on_store_delta(&self, delta: &StoreDelta) {
        self.walk(delta);
    }
}
