use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::{debug, warn};
use typegraph_core::{
    DeclarationStore, HierarchyListener, Result, TypeGraphError, TypeHandle, TypeKind,
};

/// Caller-supplied predicate narrowing a query's result set.
pub type TypeFilter<'a> = dyn Fn(&TypeHandle) -> bool + Send + Sync + 'a;
/// Caller-supplied ordering for a query's result set. Without one, results
/// come back sorted by qualified name.
pub type TypeComparator<'a> = dyn Fn(&TypeHandle, &TypeHandle) -> Ordering + Send + Sync + 'a;

pub type ListenerId = u64;

/// Transitive closure data for one base type.
#[derive(Default)]
struct Closure {
    subtypes: FxHashSet<TypeHandle>,
    supertypes: FxHashSet<TypeHandle>,
    classes: FxHashSet<TypeHandle>,
    interfaces: FxHashSet<TypeHandle>,
    /// Direct subtype edges as recorded at build/patch time, for the base
    /// and every member of its subtree. The invalidation propagator compares
    /// these against the live store to detect structural reshuffling.
    subtype_edges: FxHashMap<TypeHandle, FxHashSet<TypeHandle>>,
}

struct ResultState {
    created: bool,
    closure: Closure,
    rebuilds: u64,
}

/// What a created closure currently knows about one type; used by the
/// invalidation propagator to classify a change event.
pub(crate) struct MemberView {
    pub contained: bool,
    pub recorded_subtypes: Option<FxHashSet<TypeHandle>>,
}

/// Lazily computed hierarchy closure for a single base type.
///
/// The closure is built on first query and reused until a change event
/// invalidates it; an invalid result rebuilds on the next query. All state
/// mutation happens under the per-result lock, so unrelated base types never
/// contend.
pub struct CachedHierarchy {
    base: TypeHandle,
    store: Arc<dyn DeclarationStore>,
    state: Mutex<ResultState>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn HierarchyListener>)>>,
    next_listener: AtomicU64,
}

impl CachedHierarchy {
    pub(crate) fn new(base: TypeHandle, store: Arc<dyn DeclarationStore>) -> Self {
        Self {
            base,
            store,
            state: Mutex::new(ResultState {
                created: false,
                closure: Closure::default(),
                rebuilds: 0,
            }),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn base_type(&self) -> &TypeHandle {
        &self.base
    }

    pub fn is_created(&self) -> bool {
        self.state.lock().created
    }

    /// Number of full closure computations performed so far. Incremental
    /// patches do not move it.
    pub fn rebuild_count(&self) -> u64 {
        self.state.lock().rebuilds
    }

    /// Recompute the closure from the live store if this result is not in
    /// the created state. A no-op otherwise.
    pub fn revalidate(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_created(&mut state)
    }

    /// Mark the closure stale without recomputing it. Fires invalidation
    /// listeners only on the transition out of the created state;
    /// invalidating an already-invalid result is silent.
    pub fn invalidate(&self) {
        let transitioned = {
            let mut state = self.state.lock();
            if state.created {
                state.created = false;
                state.closure = Closure::default();
                true
            } else {
                false
            }
        };
        if transitioned {
            debug!(base = %self.base, "hierarchy invalidated");
            self.notify_invalidated();
        }
    }

    pub fn add_invalidation_listener(&self, listener: Arc<dyn HierarchyListener>) -> ListenerId {
        let id = self.next_listener.fetch_add(1, AtomicOrdering::Relaxed);
        self.listeners.write().push((id, listener));
        id
    }

    pub fn remove_invalidation_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn all_subtypes(&self) -> Result<Vec<TypeHandle>> {
        self.all_subtypes_matching(None, None)
    }

    pub fn all_subtypes_matching(
        &self,
        filter: Option<&TypeFilter<'_>>,
        order: Option<&TypeComparator<'_>>,
    ) -> Result<Vec<TypeHandle>> {
        self.collect(|c| c.subtypes.iter().cloned().collect(), filter, order)
    }

    pub fn all_supertypes(&self) -> Result<Vec<TypeHandle>> {
        self.all_supertypes_matching(None, None)
    }

    pub fn all_supertypes_matching(
        &self,
        filter: Option<&TypeFilter<'_>>,
        order: Option<&TypeComparator<'_>>,
    ) -> Result<Vec<TypeHandle>> {
        self.collect(|c| c.supertypes.iter().cloned().collect(), filter, order)
    }

    pub fn all_superclasses(&self) -> Result<Vec<TypeHandle>> {
        self.all_superclasses_matching(None, None)
    }

    pub fn all_superclasses_matching(
        &self,
        filter: Option<&TypeFilter<'_>>,
        order: Option<&TypeComparator<'_>>,
    ) -> Result<Vec<TypeHandle>> {
        self.collect(
            |c| {
                c.supertypes
                    .iter()
                    .filter(|t| c.classes.contains(*t))
                    .cloned()
                    .collect()
            },
            filter,
            order,
        )
    }

    pub fn all_super_interfaces(&self) -> Result<Vec<TypeHandle>> {
        self.all_super_interfaces_matching(None, None)
    }

    pub fn all_super_interfaces_matching(
        &self,
        filter: Option<&TypeFilter<'_>>,
        order: Option<&TypeComparator<'_>>,
    ) -> Result<Vec<TypeHandle>> {
        self.collect(
            |c| {
                c.supertypes
                    .iter()
                    .filter(|t| c.interfaces.contains(*t))
                    .cloned()
                    .collect()
            },
            filter,
            order,
        )
    }

    /// Every class in the hierarchy, the base included when it is one.
    pub fn all_classes(&self) -> Result<Vec<TypeHandle>> {
        self.all_classes_matching(None, None)
    }

    pub fn all_classes_matching(
        &self,
        filter: Option<&TypeFilter<'_>>,
        order: Option<&TypeComparator<'_>>,
    ) -> Result<Vec<TypeHandle>> {
        self.collect(|c| c.classes.iter().cloned().collect(), filter, order)
    }

    pub fn all_interfaces(&self) -> Result<Vec<TypeHandle>> {
        self.all_interfaces_matching(None, None)
    }

    pub fn all_interfaces_matching(
        &self,
        filter: Option<&TypeFilter<'_>>,
        order: Option<&TypeComparator<'_>>,
    ) -> Result<Vec<TypeHandle>> {
        self.collect(|c| c.interfaces.iter().cloned().collect(), filter, order)
    }

    /// Whether `handle` is the base or any transitive sub/supertype of it.
    pub fn contains(&self, handle: &TypeHandle) -> Result<bool> {
        let mut state = self.state.lock();
        self.ensure_created(&mut state)?;
        Ok(Self::in_closure(&state.closure, &self.base, handle))
    }

    /// Whether `candidate` is a (reflexive) subtype of `ancestor` as seen by
    /// this hierarchy. Identical handles answer true without revalidating.
    ///
    /// Answers come from the recorded closure edges: the base's whole
    /// subtree counts as below every member of the supertype closure, but
    /// ancestry between two supertype-side members is not tracked.
    pub fn is_subtype(&self, ancestor: &TypeHandle, candidate: &TypeHandle) -> Result<bool> {
        if ancestor == candidate {
            return Ok(true);
        }
        let mut state = self.state.lock();
        self.ensure_created(&mut state)?;
        let closure = &state.closure;
        if closure.supertypes.contains(ancestor) {
            return Ok(candidate == &self.base || closure.subtypes.contains(candidate));
        }
        if ancestor != &self.base && !closure.subtype_edges.contains_key(ancestor) {
            return Ok(false);
        }
        let mut queue = VecDeque::from([ancestor.clone()]);
        let mut visited = FxHashSet::default();
        while let Some(current) = queue.pop_front() {
            if let Some(edges) = closure.subtype_edges.get(&current) {
                for sub in edges {
                    if sub == candidate {
                        return Ok(true);
                    }
                    if visited.insert(sub.clone()) {
                        queue.push_back(sub.clone());
                    }
                }
            }
        }
        Ok(false)
    }

    /// Fold a newly reachable leaf type into the created closure without a
    /// rebuild. Returns false when the type cannot be patched in (it carries
    /// a subtree of its own, or the store cannot describe it) and the caller
    /// must invalidate instead.
    pub(crate) fn apply_added(&self, handle: &TypeHandle) -> bool {
        let kind = match self.store.kind(handle) {
            Ok(kind) => kind,
            Err(_) => return false,
        };
        let live_subtypes = match self.store.direct_subtypes(handle) {
            Ok(subs) => subs,
            Err(_) => return false,
        };
        if !live_subtypes.is_empty() {
            return false;
        }
        let supertypes = match self.store.direct_supertypes(handle) {
            Ok(sups) => sups,
            Err(_) => return false,
        };

        let mut state = self.state.lock();
        if !state.created {
            // nothing to patch; the next read rebuilds from scratch anyway
            return true;
        }
        let closure = &mut state.closure;
        closure.subtypes.insert(handle.clone());
        match kind {
            TypeKind::Class => closure.classes.insert(handle.clone()),
            TypeKind::Interface => closure.interfaces.insert(handle.clone()),
        };
        closure.subtype_edges.insert(handle.clone(), FxHashSet::default());
        for sup in supertypes {
            if sup == self.base || closure.subtypes.contains(&sup) {
                closure
                    .subtype_edges
                    .entry(sup)
                    .or_default()
                    .insert(handle.clone());
            }
        }
        debug!(base = %self.base, added = %handle, "patched addition into closure");
        true
    }

    pub(crate) fn member_view(&self, handle: &TypeHandle) -> Option<MemberView> {
        let state = self.state.lock();
        if !state.created {
            return None;
        }
        let closure = &state.closure;
        Some(MemberView {
            contained: Self::in_closure(closure, &self.base, handle),
            recorded_subtypes: closure.subtype_edges.get(handle).cloned(),
        })
    }

    fn in_closure(closure: &Closure, base: &TypeHandle, handle: &TypeHandle) -> bool {
        handle == base
            || closure.subtypes.contains(handle)
            || closure.supertypes.contains(handle)
    }

    fn collect(
        &self,
        pick: impl Fn(&Closure) -> Vec<TypeHandle>,
        filter: Option<&TypeFilter<'_>>,
        order: Option<&TypeComparator<'_>>,
    ) -> Result<Vec<TypeHandle>> {
        let mut out = {
            let mut state = self.state.lock();
            self.ensure_created(&mut state)?;
            pick(&state.closure)
        };
        if let Some(filter) = filter {
            out.retain(|t| filter(t));
        }
        match order {
            Some(cmp) => out.sort_by(|a, b| cmp(a, b)),
            None => out.sort_by(|a, b| a.qualified_name().cmp(b.qualified_name())),
        }
        Ok(out)
    }

    fn ensure_created(&self, state: &mut ResultState) -> Result<()> {
        if state.created {
            return Ok(());
        }
        if !self.store.exists(&self.base) {
            return Err(TypeGraphError::BaseTypeUnavailable(self.base.to_string()));
        }

        let mut closure = Closure::default();
        self.classify(&self.base, &mut closure);

        // subtree walk, recording direct edges as we go
        let mut queue = VecDeque::from([self.base.clone()]);
        let mut visited = FxHashSet::default();
        visited.insert(self.base.clone());
        while let Some(current) = queue.pop_front() {
            let subs = match self.store.direct_subtypes(&current) {
                Ok(subs) => subs,
                Err(e) => {
                    debug!(candidate = %current, error = %e, "skipping unreadable candidate");
                    continue;
                }
            };
            let mut edges = FxHashSet::default();
            for sub in subs {
                if visited.contains(&sub) {
                    edges.insert(sub);
                    continue;
                }
                if !self.classify(&sub, &mut closure) {
                    continue;
                }
                edges.insert(sub.clone());
                visited.insert(sub.clone());
                closure.subtypes.insert(sub.clone());
                queue.push_back(sub);
            }
            closure.subtype_edges.insert(current, edges);
        }

        // ancestor walk
        let mut queue = VecDeque::from([self.base.clone()]);
        let mut visited = FxHashSet::default();
        visited.insert(self.base.clone());
        while let Some(current) = queue.pop_front() {
            let sups = match self.store.direct_supertypes(&current) {
                Ok(sups) => sups,
                Err(e) => {
                    debug!(candidate = %current, error = %e, "skipping unreadable candidate");
                    continue;
                }
            };
            for sup in sups {
                if !visited.insert(sup.clone()) {
                    continue;
                }
                if !self.classify(&sup, &mut closure) {
                    continue;
                }
                closure.supertypes.insert(sup.clone());
                queue.push_back(sup);
            }
        }

        state.closure = closure;
        state.created = true;
        state.rebuilds += 1;
        debug!(base = %self.base, rebuilds = state.rebuilds, "hierarchy closure built");
        Ok(())
    }

    fn classify(&self, handle: &TypeHandle, closure: &mut Closure) -> bool {
        match self.store.kind(handle) {
            Ok(TypeKind::Class) => {
                closure.classes.insert(handle.clone());
                true
            }
            Ok(TypeKind::Interface) => {
                closure.interfaces.insert(handle.clone());
                true
            }
            Err(e) => {
                debug!(candidate = %handle, error = %e, "skipping candidate with unreadable declaration");
                false
            }
        }
    }

    fn notify_invalidated(&self) {
        let listeners: Vec<_> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            if let Err(e) = listener.on_invalidated(&self.base) {
                warn!(base = %self.base, error = %e, "invalidation listener failed");
            }
        }
    }
}
