use crate::CachedHierarchy;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::info;
use typegraph_core::{DeclarationStore, HierarchyConfig, Result, TypeGraphError, TypeHandle};

/// Registry of cached hierarchy results, one per primary base type.
///
/// Explicitly constructed with its declaration store and passed by handle to
/// consumers; cloning shares the underlying registry. Lookups are
/// identity-stable: the same base type always resolves to the same result
/// object, so listeners attached once keep receiving invalidations.
#[derive(Clone)]
pub struct HierarchyCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    store: Arc<dyn DeclarationStore>,
    config: HierarchyConfig,
    results: Mutex<FxHashMap<TypeHandle, Arc<CachedHierarchy>>>,
}

impl HierarchyCache {
    pub fn new(store: Arc<dyn DeclarationStore>) -> Self {
        Self::with_config(store, HierarchyConfig::default())
    }

    pub fn with_config(store: Arc<dyn DeclarationStore>, config: HierarchyConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                config,
                results: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Resolve the cached hierarchy anchored at `base`, creating an
    /// un-built entry on first request. Only primary (top-level) types may
    /// anchor a cached hierarchy; nested types need a one-shot local
    /// hierarchy instead.
    pub fn get_hierarchy(&self, base: &TypeHandle) -> Result<Arc<CachedHierarchy>> {
        if !base.is_primary() {
            return Err(TypeGraphError::InvalidArgument(format!(
                "nested type cannot anchor a cached hierarchy: {}",
                base
            )));
        }
        if !self.inner.store.exists(base) {
            return Err(TypeGraphError::InvalidArgument(format!(
                "base type does not exist: {}",
                base
            )));
        }
        let mut results = self.inner.results.lock();
        let result = results
            .entry(base.clone())
            .or_insert_with(|| {
                Arc::new(CachedHierarchy::new(base.clone(), self.inner.store.clone()))
            })
            .clone();
        Ok(result)
    }

    /// Number of results currently registered (created or not).
    pub fn cached_count(&self) -> usize {
        self.inner.results.lock().len()
    }

    /// Drop every cached result. Subsequent lookups rebuild fresh entries;
    /// results already handed out keep working but are no longer tracked by
    /// the change pipeline.
    pub fn dispose(&self) {
        let count = {
            let mut results = self.inner.results.lock();
            let count = results.len();
            results.clear();
            count
        };
        info!(dropped = count, "hierarchy cache disposed");
    }

    /// Snapshot of the results currently in the created state, taken under
    /// the registry lock so the sweep itself runs without holding it.
    pub(crate) fn created_results(&self) -> Vec<Arc<CachedHierarchy>> {
        self.inner
            .results
            .lock()
            .values()
            .filter(|result| result.is_created())
            .cloned()
            .collect()
    }

    pub(crate) fn store(&self) -> &Arc<dyn DeclarationStore> {
        &self.inner.store
    }

    pub(crate) fn config(&self) -> &HierarchyConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typegraph_core::{InMemoryDeclarationStore, TypeKind, UnitId};

    fn fixture() -> (Arc<InMemoryDeclarationStore>, TypeHandle) {
        let store = Arc::new(InMemoryDeclarationStore::new());
        let base = TypeHandle::primary(UnitId::from("base.x"), "p.Base");
        store.insert_type(base.clone(), TypeKind::Class, vec![]);
        (store, base)
    }

    #[test]
    fn lookups_are_identity_stable() {
        let (store, base) = fixture();
        let cache = HierarchyCache::new(store);

        let first = cache.get_hierarchy(&base).unwrap();
        let second = cache.get_hierarchy(&base).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.cached_count(), 1);
    }

    #[test]
    fn nested_base_is_rejected() {
        let (store, base) = fixture();
        let nested = TypeHandle::nested(base.clone(), "Inner");
        store.insert_type(nested.clone(), TypeKind::Class, vec![base]);
        let cache = HierarchyCache::new(store);

        assert!(matches!(
            cache.get_hierarchy(&nested),
            Err(TypeGraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn unknown_base_is_rejected() {
        let (store, _) = fixture();
        let cache = HierarchyCache::new(store);
        let ghost = TypeHandle::primary(UnitId::from("g.x"), "p.Ghost");

        assert!(matches!(
            cache.get_hierarchy(&ghost),
            Err(TypeGraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn dispose_clears_and_rebuilds_fresh() {
        let (store, base) = fixture();
        let cache = HierarchyCache::new(store);

        let before = cache.get_hierarchy(&base).unwrap();
        cache.dispose();
        assert_eq!(cache.cached_count(), 0);
        let after = cache.get_hierarchy(&base).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
