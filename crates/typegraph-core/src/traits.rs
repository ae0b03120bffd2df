use crate::{ChangeEvent, ModificationStamp, Result, StoreDelta, TypeHandle, TypeKind, UnitId};
use std::sync::Arc;

/// The narrow interface the hierarchy cache consumes from the symbol
/// provider. Everything the cache knows about declared types flows through
/// these queries; the cache never sees source text.
///
/// Implementations must be callable from the store's own change-notification
/// thread without blocking on I/O.
pub trait DeclarationStore: Send + Sync {
    fn exists(&self, handle: &TypeHandle) -> bool;

    fn kind(&self, handle: &TypeHandle) -> Result<TypeKind>;

    /// Direct supertypes, classes and interfaces combined. Kinds are
    /// distinguished via [`DeclarationStore::kind`].
    fn direct_supertypes(&self, handle: &TypeHandle) -> Result<Vec<TypeHandle>>;

    fn direct_subtypes(&self, handle: &TypeHandle) -> Result<Vec<TypeHandle>>;

    fn declaring_type(&self, handle: &TypeHandle) -> Option<TypeHandle>;

    /// Stamp of the last committed mutation touching `unit`. Units the store
    /// has never seen report zero.
    fn modification_stamp(&self, unit: &UnitId) -> ModificationStamp;

    fn register_delta_listener(&self, listener: Arc<dyn DeltaListener>);
}

/// Receives raw structural change trees from a declaration store.
pub trait DeltaListener: Send + Sync {
    fn on_store_delta(&self, delta: &StoreDelta);
}

/// External subscriber to normalized change events. Errors are logged and do
/// not stop delivery to later subscribers.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent) -> Result<()>;
}

/// Notified when a cached hierarchy result transitions from created to
/// invalid. Errors are logged and do not stop delivery.
pub trait HierarchyListener: Send + Sync {
    fn on_invalidated(&self, base: &TypeHandle) -> Result<()>;
}
