use crate::{CachedHierarchy, HierarchyCache};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use typegraph_core::{ChangeEvent, ChangeEventKind, DeclarationStore, TypeHandle};

/// Walks the created hierarchy results for each change event and applies the
/// minimal action per result: patch a membership addition, invalidate on
/// removal or structural reshuffling, otherwise leave the result alone.
///
/// Membership changes are the overwhelmingly common case and are cheap to
/// patch; reparenting is rare and falls back to a full invalidate.
pub struct InvalidationPropagator {
    cache: HierarchyCache,
}

impl InvalidationPropagator {
    pub fn new(cache: HierarchyCache) -> Self {
        Self { cache }
    }

    pub fn on_change(&self, event: &ChangeEvent) {
        if event.is_buffer_transition() {
            return;
        }
        let Some(affected) = event.element.as_type() else {
            debug!(element = %event.element, "non-type change, no hierarchy impact");
            return;
        };
        // copy the created results out so per-result work runs without the
        // registry lock
        let results = self.cache.created_results();
        if results.is_empty() {
            return;
        }
        let start = Instant::now();
        for result in &results {
            self.classify_and_apply(result, affected, event);
        }
        let elapsed = start.elapsed();
        if elapsed > self.cache.config().sweep_warn_threshold() {
            warn!(
                results = results.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "slow invalidation sweep"
            );
        }
    }

    fn classify_and_apply(
        &self,
        result: &Arc<CachedHierarchy>,
        affected: &TypeHandle,
        event: &ChangeEvent,
    ) {
        let store = self.cache.store();
        // the result may have left the created state earlier in this sweep
        let Some(view) = result.member_view(affected) else {
            return;
        };

        if !view.contained {
            if event.kind == ChangeEventKind::Removed {
                return;
            }
            if reaches(store, affected, result.base_type()) {
                // addition: fold in without a rebuild when possible
                if !result.apply_added(affected) {
                    result.invalidate();
                }
            }
            return;
        }

        match &view.recorded_subtypes {
            Some(recorded) => {
                let live = match store.direct_subtypes(affected) {
                    Ok(live) => live,
                    Err(e) => {
                        debug!(affected = %affected, error = %e, "member no longer readable");
                        result.invalidate();
                        return;
                    }
                };
                let live_set: FxHashSet<TypeHandle> = live.into_iter().collect();
                if live_set != *recorded {
                    // structural change: no incremental patch attempted
                    result.invalidate();
                    return;
                }
                if affected == result.base_type() {
                    return;
                }
                if !reaches(store, affected, result.base_type()) {
                    // removal: the member fell out of the subtree
                    result.invalidate();
                }
            }
            None => {
                // supertype-side member: no recorded edges to compare, so
                // classify against the snapshot carried on the event
                let Some(snapshot) = &event.supertype_snapshot else {
                    result.invalidate();
                    return;
                };
                match store.direct_supertypes(affected) {
                    Ok(live) => {
                        let live_set: FxHashSet<TypeHandle> = live.into_iter().collect();
                        let snapshot_set: FxHashSet<TypeHandle> =
                            snapshot.iter().cloned().collect();
                        if live_set != snapshot_set {
                            result.invalidate();
                        }
                    }
                    Err(_) => result.invalidate(),
                }
            }
        }
    }
}

/// Whether `from` transitively reaches `target` through the live supertype
/// edges. Unreadable candidates are skipped, not fatal.
fn reaches(store: &Arc<dyn DeclarationStore>, from: &TypeHandle, target: &TypeHandle) -> bool {
    let mut queue = VecDeque::from([from.clone()]);
    let mut visited = FxHashSet::default();
    visited.insert(from.clone());
    while let Some(current) = queue.pop_front() {
        let supers = match store.direct_supertypes(&current) {
            Ok(supers) => supers,
            Err(e) => {
                debug!(candidate = %current, error = %e, "skipping unreadable candidate in reachability walk");
                continue;
            }
        };
        for sup in supers {
            if &sup == target {
                return true;
            }
            if visited.insert(sup.clone()) {
                queue.push_back(sup);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use typegraph_core::{Element, InMemoryDeclarationStore, TypeKind, UnitId};

    fn handle(name: &str) -> TypeHandle {
        TypeHandle::primary(UnitId::from(format!("{name}.x")), name)
    }

    struct Fixture {
        store: Arc<InMemoryDeclarationStore>,
        cache: HierarchyCache,
        propagator: InvalidationPropagator,
        base: TypeHandle,
        mid: TypeHandle,
        leaf: TypeHandle,
    }

    /// Base <- Mid <- Leaf, with the base hierarchy already created.
    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryDeclarationStore::new());
        let base = handle("p.Base");
        let mid = handle("p.Mid");
        let leaf = handle("p.Leaf");
        store.insert_type(base.clone(), TypeKind::Class, vec![]);
        store.insert_type(mid.clone(), TypeKind::Class, vec![base.clone()]);
        store.insert_type(leaf.clone(), TypeKind::Class, vec![mid.clone()]);
        let cache = HierarchyCache::new(store.clone());
        cache.get_hierarchy(&base).unwrap().revalidate().unwrap();
        let propagator = InvalidationPropagator::new(cache.clone());
        Fixture {
            store,
            cache,
            propagator,
            base,
            mid,
            leaf,
        }
    }

    fn changed(t: &TypeHandle, old_supers: Vec<TypeHandle>) -> ChangeEvent {
        ChangeEvent::new(ChangeEventKind::Changed, Element::Type(t.clone()))
            .with_snapshot(old_supers)
    }

    #[test]
    fn unrelated_type_leaves_created_flags_alone() {
        let f = fixture();
        let loner = handle("q.Loner");
        f.store.insert_type(loner.clone(), TypeKind::Class, vec![]);

        f.propagator
            .on_change(&ChangeEvent::new(ChangeEventKind::Added, Element::Type(loner)));

        let hierarchy = f.cache.get_hierarchy(&f.base).unwrap();
        assert!(hierarchy.is_created());
        assert_eq!(hierarchy.rebuild_count(), 1);
    }

    #[test]
    fn leaf_addition_is_patched_without_rebuild() {
        let f = fixture();
        let newcomer = handle("p.Newcomer");
        f.store
            .insert_type(newcomer.clone(), TypeKind::Class, vec![f.base.clone()]);

        f.propagator.on_change(&ChangeEvent::new(
            ChangeEventKind::Added,
            Element::Type(newcomer.clone()),
        ));

        let hierarchy = f.cache.get_hierarchy(&f.base).unwrap();
        assert!(hierarchy.is_created());
        assert!(hierarchy.contains(&newcomer).unwrap());
        assert_eq!(hierarchy.rebuild_count(), 1);
    }

    #[test]
    fn membership_removal_invalidates() {
        let f = fixture();
        let old = f.store.direct_supertypes(&f.leaf).unwrap();
        f.store.set_supertypes(&f.leaf, vec![]).unwrap();

        f.propagator.on_change(&changed(&f.leaf, old));

        let hierarchy = f.cache.get_hierarchy(&f.base).unwrap();
        assert!(!hierarchy.is_created());
        assert!(!hierarchy.contains(&f.leaf).unwrap());
        assert_eq!(hierarchy.rebuild_count(), 2);
    }

    #[test]
    fn stale_recorded_subtypes_trigger_structural_invalidate() {
        let f = fixture();
        // reparent Leaf directly under Base; the event about Leaf leaves the
        // base hierarchy patched but its recorded Mid -> Leaf edge is stale
        let old = f.store.direct_supertypes(&f.leaf).unwrap();
        f.store
            .set_supertypes(&f.leaf, vec![f.base.clone()])
            .unwrap();
        f.propagator.on_change(&changed(&f.leaf, old));
        let hierarchy = f.cache.get_hierarchy(&f.base).unwrap();
        assert!(hierarchy.is_created());

        // the next event about Mid compares recorded {Leaf} to live {}
        let mid_supers = f.store.direct_supertypes(&f.mid).unwrap();
        f.store
            .set_supertypes(&f.mid, mid_supers.clone())
            .unwrap();
        f.propagator.on_change(&changed(&f.mid, mid_supers));
        assert!(!hierarchy.is_created());
    }

    #[test]
    fn supertype_side_change_compares_snapshot() {
        let f = fixture();
        let root = handle("p.Root");
        f.store.insert_type(root.clone(), TypeKind::Class, vec![]);
        f.store
            .set_supertypes(&f.base, vec![root.clone()])
            .unwrap();

        // hierarchy anchored at Mid sees Base on its supertype side
        let mid_hierarchy = f.cache.get_hierarchy(&f.mid).unwrap();
        mid_hierarchy.revalidate().unwrap();
        let newer = f.store.direct_supertypes(&f.base).unwrap();
        f.store.set_supertypes(&f.base, vec![]).unwrap();
        f.propagator.on_change(&changed(&f.base, newer));

        assert!(!mid_hierarchy.is_created());
    }

    #[test]
    fn member_level_events_are_ignored() {
        let f = fixture();
        f.propagator.on_change(&ChangeEvent::new(
            ChangeEventKind::Changed,
            Element::Member {
                owner: f.mid.clone(),
                name: "run".to_string(),
            },
        ));

        assert!(f.cache.get_hierarchy(&f.base).unwrap().is_created());
    }

    #[test]
    fn removed_type_that_was_never_a_member_is_a_noop() {
        let f = fixture();
        let loner = handle("q.Loner");
        f.store.insert_type(loner.clone(), TypeKind::Class, vec![]);
        f.store.remove_type(&loner).unwrap();

        f.propagator.on_change(
            &ChangeEvent::new(ChangeEventKind::Removed, Element::Type(loner))
                .with_snapshot(vec![]),
        );

        assert!(f.cache.get_hierarchy(&f.base).unwrap().is_created());
    }
}
