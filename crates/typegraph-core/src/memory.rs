use crate::{
    DeclarationStore, DeltaKind, DeltaListener, Element, ModificationStamp, Result, StoreDelta,
    TypeGraphError, TypeHandle, TypeKind, UnitId,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct TypeRecord {
    kind: TypeKind,
    supertypes: Vec<TypeHandle>,
}

/// Reference declaration store backed by in-memory maps.
///
/// The mutation API snapshots a type's old supertypes into the emitted delta
/// before the live record changes, so downstream consumers can classify an
/// event even though the store has already moved on. Each mutation is
/// reported as a unit-level composite delta wrapping the type-level leaf,
/// the same shape a real symbol provider reports for an edited source unit.
pub struct InMemoryDeclarationStore {
    types: RwLock<FxHashMap<TypeHandle, TypeRecord>>,
    /// Reverse extends/implements edges: supertype -> declared subtypes.
    subtypes: RwLock<FxHashMap<TypeHandle, FxHashSet<TypeHandle>>>,
    stamps: DashMap<UnitId, ModificationStamp>,
    listeners: RwLock<Vec<Arc<dyn DeltaListener>>>,
}

impl Default for InMemoryDeclarationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDeclarationStore {
    pub fn new() -> Self {
        Self {
            types: RwLock::new(FxHashMap::default()),
            subtypes: RwLock::new(FxHashMap::default()),
            stamps: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Declare a new type. Supertypes may be forward references to types
    /// declared later.
    pub fn insert_type(&self, handle: TypeHandle, kind: TypeKind, supertypes: Vec<TypeHandle>) {
        {
            let mut types = self.types.write();
            let mut reverse = self.subtypes.write();
            for sup in &supertypes {
                reverse.entry(sup.clone()).or_default().insert(handle.clone());
            }
            types.insert(
                handle.clone(),
                TypeRecord {
                    kind,
                    supertypes: supertypes.clone(),
                },
            );
        }
        self.bump_stamp(handle.unit());
        self.notify(self.unit_delta(
            StoreDelta::leaf(DeltaKind::Added, Element::Type(handle)).with_snapshot(supertypes),
        ));
    }

    /// Rewire a type's declared supertypes. The emitted delta carries the
    /// old set as its snapshot.
    pub fn set_supertypes(&self, handle: &TypeHandle, supertypes: Vec<TypeHandle>) -> Result<()> {
        let old = {
            let mut types = self.types.write();
            let record = types
                .get_mut(handle)
                .ok_or_else(|| TypeGraphError::Store(format!("unknown type: {}", handle)))?;
            let old = std::mem::replace(&mut record.supertypes, supertypes.clone());

            let mut reverse = self.subtypes.write();
            for sup in &old {
                if let Some(set) = reverse.get_mut(sup) {
                    set.remove(handle);
                }
            }
            for sup in &supertypes {
                reverse.entry(sup.clone()).or_default().insert(handle.clone());
            }
            old
        };
        self.bump_stamp(handle.unit());
        self.notify(self.unit_delta(
            StoreDelta::leaf(DeltaKind::Changed, Element::Type(handle.clone())).with_snapshot(old),
        ));
        Ok(())
    }

    pub fn remove_type(&self, handle: &TypeHandle) -> Result<()> {
        let old = {
            let mut types = self.types.write();
            let record = types
                .remove(handle)
                .ok_or_else(|| TypeGraphError::Store(format!("unknown type: {}", handle)))?;

            let mut reverse = self.subtypes.write();
            for sup in &record.supertypes {
                if let Some(set) = reverse.get_mut(sup) {
                    set.remove(handle);
                }
            }
            reverse.remove(handle);
            record.supertypes
        };
        self.bump_stamp(handle.unit());
        self.notify(self.unit_delta(
            StoreDelta::leaf(DeltaKind::Removed, Element::Type(handle.clone())).with_snapshot(old),
        ));
        Ok(())
    }

    /// Report a member-level edit inside `owner` (body change, annotation).
    /// Does not touch hierarchy edges but flows through the event pipeline.
    pub fn touch_member(&self, owner: &TypeHandle, name: &str) -> Result<()> {
        if !self.types.read().contains_key(owner) {
            return Err(TypeGraphError::Store(format!("unknown type: {}", owner)));
        }
        self.bump_stamp(owner.unit());
        self.notify(self.unit_delta(StoreDelta::leaf(
            DeltaKind::Changed,
            Element::Member {
                owner: owner.clone(),
                name: name.to_string(),
            },
        )));
        Ok(())
    }

    pub fn type_count(&self) -> usize {
        self.types.read().len()
    }

    fn unit_delta(&self, leaf: StoreDelta) -> StoreDelta {
        let unit = leaf.element.owning_unit().clone();
        StoreDelta::composite(Element::Unit(unit), vec![leaf])
    }

    fn bump_stamp(&self, unit: &UnitId) {
        self.stamps
            .entry(unit.clone())
            .and_modify(|stamp| *stamp += 1)
            .or_insert(1);
    }

    fn notify(&self, delta: StoreDelta) {
        let listeners: Vec<_> = self.listeners.read().iter().cloned().collect();
        debug!(element = %delta.element, listeners = listeners.len(), "store delta");
        for listener in listeners {
            listener.on_store_delta(&delta);
        }
    }
}

impl DeclarationStore for InMemoryDeclarationStore {
    fn exists(&self, handle: &TypeHandle) -> bool {
        self.types.read().contains_key(handle)
    }

    fn kind(&self, handle: &TypeHandle) -> Result<TypeKind> {
        self.types
            .read()
            .get(handle)
            .map(|record| record.kind)
            .ok_or_else(|| TypeGraphError::Store(format!("unknown type: {}", handle)))
    }

    fn direct_supertypes(&self, handle: &TypeHandle) -> Result<Vec<TypeHandle>> {
        self.types
            .read()
            .get(handle)
            .map(|record| record.supertypes.clone())
            .ok_or_else(|| TypeGraphError::Store(format!("unknown type: {}", handle)))
    }

    fn direct_subtypes(&self, handle: &TypeHandle) -> Result<Vec<TypeHandle>> {
        if !self.types.read().contains_key(handle) {
            return Err(TypeGraphError::Store(format!("unknown type: {}", handle)));
        }
        let mut subs: Vec<TypeHandle> = self
            .subtypes
            .read()
            .get(handle)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        subs.sort_by(|a, b| a.qualified_name().cmp(b.qualified_name()));
        Ok(subs)
    }

    fn declaring_type(&self, handle: &TypeHandle) -> Option<TypeHandle> {
        handle.declaring_type().cloned()
    }

    fn modification_stamp(&self, unit: &UnitId) -> ModificationStamp {
        self.stamps.get(unit).map(|stamp| *stamp).unwrap_or(0)
    }

    fn register_delta_listener(&self, listener: Arc<dyn DeltaListener>) {
        self.listeners.write().push(listener);
    }
}
