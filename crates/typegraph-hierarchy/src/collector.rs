use rustc_hash::FxHashMap;
use typegraph_core::{ChangeEvent, Element, ModificationStamp, UnitId};

/// Pending change events for one working copy.
///
/// Editors generate dozens of structural deltas per keystroke; firing each
/// one through hierarchy invalidation would make the cache thrash. The
/// collector holds at most one pending event per element (later events
/// overwrite earlier ones) and keeps first-touch insertion order for the
/// eventual drain, bounding the batch by the number of distinct elements
/// touched rather than the number of edits.
pub struct UnitEventCollector {
    unit: UnitId,
    /// Stamp of the unit when it became a working copy. A release that sees
    /// the same stamp means nothing externally observable changed.
    baseline_stamp: ModificationStamp,
    slots: FxHashMap<Element, usize>,
    pending: Vec<ChangeEvent>,
}

impl UnitEventCollector {
    pub fn new(unit: UnitId, baseline_stamp: ModificationStamp) -> Self {
        Self {
            unit,
            baseline_stamp,
            slots: FxHashMap::default(),
            pending: Vec::new(),
        }
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    pub fn baseline_stamp(&self) -> ModificationStamp {
        self.baseline_stamp
    }

    /// Upsert keyed by the affected element; the last event per element
    /// wins. Returns true when this was the first event since the collector
    /// became empty, which is the edge the synthetic `BufferDirty` fires on.
    pub fn add_event(&mut self, event: ChangeEvent) -> bool {
        let first = self.pending.is_empty();
        match self.slots.get(&event.element) {
            Some(&slot) => self.pending[slot] = event,
            None => {
                self.slots.insert(event.element.clone(), self.pending.len());
                self.pending.push(event);
            }
        }
        first
    }

    /// Empty the collector atomically, returning the batch in first-touch
    /// order.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        self.slots.clear();
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typegraph_core::{ChangeEventKind, TypeHandle};

    fn event(kind: ChangeEventKind, name: &str) -> ChangeEvent {
        let handle = TypeHandle::primary(UnitId::from("wc.x"), name);
        ChangeEvent::new(kind, Element::Type(handle))
    }

    #[test]
    fn repeated_edits_to_one_element_coalesce() {
        let mut collector = UnitEventCollector::new(UnitId::from("wc.x"), 7);

        for _ in 0..1000 {
            collector.add_event(event(ChangeEventKind::Changed, "p.T"));
        }
        assert_eq!(collector.len(), 1);

        let batch = collector.drain();
        assert_eq!(batch.len(), 1);
        assert!(collector.is_empty());
    }

    #[test]
    fn last_event_per_element_wins() {
        let mut collector = UnitEventCollector::new(UnitId::from("wc.x"), 0);
        collector.add_event(event(ChangeEventKind::Added, "p.T"));
        collector.add_event(event(ChangeEventKind::Changed, "p.T"));

        let batch = collector.drain();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].kind, ChangeEventKind::Changed);
    }

    #[test]
    fn drain_keeps_first_touch_order() {
        let mut collector = UnitEventCollector::new(UnitId::from("wc.x"), 0);
        collector.add_event(event(ChangeEventKind::Added, "p.A"));
        collector.add_event(event(ChangeEventKind::Added, "p.B"));
        collector.add_event(event(ChangeEventKind::Changed, "p.A"));

        let batch = collector.drain();
        let names: Vec<_> = batch
            .iter()
            .filter_map(|e| e.element.as_type().map(|t| t.qualified_name().to_string()))
            .collect();
        assert_eq!(names, vec!["p.A", "p.B"]);
    }

    #[test]
    fn first_event_edge_resets_after_drain() {
        let mut collector = UnitEventCollector::new(UnitId::from("wc.x"), 0);
        assert!(collector.add_event(event(ChangeEventKind::Added, "p.A")));
        assert!(!collector.add_event(event(ChangeEventKind::Added, "p.B")));
        collector.drain();
        assert!(collector.add_event(event(ChangeEventKind::Added, "p.C")));
    }
}
