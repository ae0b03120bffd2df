use crate::{CachedHierarchy, TypeComparator, TypeFilter};
use std::sync::Arc;
use typegraph_core::{Result, TypeHandle};

/// Read-only view over a cached hierarchy restricted to primary (top-level)
/// types. Every query delegates to the wrapped result with the primary
/// predicate conjoined to any caller filter; the decorator caches nothing of
/// its own.
pub struct PrimaryFilteredHierarchy {
    inner: Arc<CachedHierarchy>,
}

/// Decorator constructor.
pub fn as_primary_only(result: Arc<CachedHierarchy>) -> PrimaryFilteredHierarchy {
    PrimaryFilteredHierarchy { inner: result }
}

impl PrimaryFilteredHierarchy {
    pub fn base_type(&self) -> &TypeHandle {
        self.inner.base_type()
    }

    pub fn all_subtypes(&self) -> Result<Vec<TypeHandle>> {
        self.all_subtypes_matching(None, None)
    }

    pub fn all_subtypes_matching(
        &self,
        filter: Option<&TypeFilter<'_>>,
        order: Option<&TypeComparator<'_>>,
    ) -> Result<Vec<TypeHandle>> {
        let conjoined = conjoin(filter);
        self.inner.all_subtypes_matching(Some(&conjoined), order)
    }

    pub fn all_supertypes(&self) -> Result<Vec<TypeHandle>> {
        self.all_supertypes_matching(None, None)
    }

    pub fn all_supertypes_matching(
        &self,
        filter: Option<&TypeFilter<'_>>,
        order: Option<&TypeComparator<'_>>,
    ) -> Result<Vec<TypeHandle>> {
        let conjoined = conjoin(filter);
        self.inner.all_supertypes_matching(Some(&conjoined), order)
    }

    pub fn all_superclasses(&self) -> Result<Vec<TypeHandle>> {
        let conjoined = conjoin(None);
        self.inner.all_superclasses_matching(Some(&conjoined), None)
    }

    pub fn all_super_interfaces(&self) -> Result<Vec<TypeHandle>> {
        let conjoined = conjoin(None);
        self.inner
            .all_super_interfaces_matching(Some(&conjoined), None)
    }

    pub fn all_classes(&self) -> Result<Vec<TypeHandle>> {
        let conjoined = conjoin(None);
        self.inner.all_classes_matching(Some(&conjoined), None)
    }

    pub fn all_interfaces(&self) -> Result<Vec<TypeHandle>> {
        let conjoined = conjoin(None);
        self.inner.all_interfaces_matching(Some(&conjoined), None)
    }

    /// Non-primary arguments answer false without touching the wrapped
    /// result, so no closure computation is paid to answer "no".
    pub fn contains(&self, handle: &TypeHandle) -> Result<bool> {
        if !handle.is_primary() {
            return Ok(false);
        }
        self.inner.contains(handle)
    }

    pub fn is_subtype(&self, ancestor: &TypeHandle, candidate: &TypeHandle) -> Result<bool> {
        if !ancestor.is_primary() || !candidate.is_primary() {
            return Ok(false);
        }
        self.inner.is_subtype(ancestor, candidate)
    }
}

fn conjoin<'a>(
    caller: Option<&'a TypeFilter<'a>>,
) -> impl Fn(&TypeHandle) -> bool + Send + Sync + 'a {
    move |handle| handle.is_primary() && caller.map_or(true, |f| f(handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use typegraph_core::{InMemoryDeclarationStore, TypeKind, UnitId};

    /// Base with a primary subtype and a nested subtype.
    fn fixture() -> (Arc<CachedHierarchy>, TypeHandle, TypeHandle) {
        let store = Arc::new(InMemoryDeclarationStore::new());
        let base = TypeHandle::primary(UnitId::from("base.x"), "p.Base");
        let outer = TypeHandle::primary(UnitId::from("outer.x"), "p.Outer");
        let nested = TypeHandle::nested(outer.clone(), "Inner");
        let sub = TypeHandle::primary(UnitId::from("sub.x"), "p.Sub");
        store.insert_type(base.clone(), TypeKind::Class, vec![]);
        store.insert_type(outer.clone(), TypeKind::Class, vec![]);
        store.insert_type(sub.clone(), TypeKind::Class, vec![base.clone()]);
        store.insert_type(nested.clone(), TypeKind::Class, vec![base.clone()]);
        let hierarchy = Arc::new(CachedHierarchy::new(base, store));
        (hierarchy, sub, nested)
    }

    #[test]
    fn nested_subtypes_are_filtered_out() {
        let (hierarchy, sub, nested) = fixture();

        assert!(hierarchy.contains(&nested).unwrap());
        let primary_view = as_primary_only(hierarchy);
        assert_eq!(primary_view.all_subtypes().unwrap(), vec![sub]);
        assert!(!primary_view.contains(&nested).unwrap());
    }

    #[test]
    fn caller_filter_is_conjoined() {
        let (hierarchy, sub, _) = fixture();
        let primary_view = as_primary_only(hierarchy);

        let none: Vec<_> = primary_view
            .all_subtypes_matching(Some(&|t: &TypeHandle| t != &sub), None)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn non_primary_arguments_short_circuit() {
        let (hierarchy, _, nested) = fixture();
        let base = hierarchy.base_type().clone();
        let primary_view = as_primary_only(hierarchy.clone());

        assert!(!primary_view.is_subtype(&base, &nested).unwrap());
        assert!(!primary_view.contains(&nested).unwrap());
        // rejection happened before any closure computation was forced
        assert_eq!(hierarchy.rebuild_count(), 0);
    }
}
