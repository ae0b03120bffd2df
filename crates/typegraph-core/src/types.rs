use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a source unit (one editable document in the declaration
/// store). Units are the granularity at which working copies exist and at
/// which modification stamps are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(String);

impl UnitId {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UnitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Monotonic per-unit counter bumped by the store on every committed
/// mutation. Working-copy buffer churn does not move it.
pub type ModificationStamp = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Class,
    Interface,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Class => f.write_str("class"),
            TypeKind::Interface => f.write_str("interface"),
        }
    }
}

/// Handle to a declared type in the store.
///
/// Identity is the qualified name plus the declaring context; the kind and
/// the supertype edges are store-side state and may change under a handle.
/// A handle can go stale after edits, so existence must be re-verified
/// against the store before trusting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeHandle {
    unit: UnitId,
    qualified_name: String,
    declaring: Option<Box<TypeHandle>>,
}

impl TypeHandle {
    /// Handle for a top-level (primary) type declared directly in `unit`.
    pub fn primary<S: Into<String>>(unit: UnitId, qualified_name: S) -> Self {
        Self {
            unit,
            qualified_name: qualified_name.into(),
            declaring: None,
        }
    }

    /// Handle for a type nested inside `declaring`. The owning unit is
    /// inherited from the declaring type.
    pub fn nested<S: Into<String>>(declaring: TypeHandle, simple_name: S) -> Self {
        let unit = declaring.unit.clone();
        let qualified_name = format!("{}.{}", declaring.qualified_name, simple_name.into());
        Self {
            unit,
            qualified_name,
            declaring: Some(Box::new(declaring)),
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Last segment of the qualified name.
    pub fn simple_name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    pub fn declaring_type(&self) -> Option<&TypeHandle> {
        self.declaring.as_deref()
    }

    /// A primary type is a top-level declaration (no declaring type).
    pub fn is_primary(&self) -> bool {
        self.declaring.is_none()
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.qualified_name, self.unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Unit,
    Type,
    Member,
}

/// An element a change event can refer to, at any granularity the store
/// reports: a whole source unit, a type declaration, or a member inside a
/// type (method, field, annotation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Element {
    Unit(UnitId),
    Type(TypeHandle),
    Member { owner: TypeHandle, name: String },
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Unit(_) => ElementKind::Unit,
            Element::Type(_) => ElementKind::Type,
            Element::Member { .. } => ElementKind::Member,
        }
    }

    /// The source unit this element lives in.
    pub fn owning_unit(&self) -> &UnitId {
        match self {
            Element::Unit(unit) => unit,
            Element::Type(handle) => handle.unit(),
            Element::Member { owner, .. } => owner.unit(),
        }
    }

    /// The affected type, when the element is (or is owned by) one.
    pub fn as_type(&self) -> Option<&TypeHandle> {
        match self {
            Element::Type(handle) => Some(handle),
            _ => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Unit(unit) => write!(f, "unit {}", unit),
            Element::Type(handle) => write!(f, "type {}", handle),
            Element::Member { owner, name } => write!(f, "member {}::{}", owner, name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeEventKind {
    Added,
    Removed,
    Changed,
    /// Change that originated outside the store's own mutation API
    /// (e.g. the backing resource was swapped underneath it).
    ExternalChange,
    /// Synthetic: a working copy accumulated its first pending event.
    BufferDirty,
    /// Synthetic: a working copy was released.
    BufferSync,
}

/// Normalized change notification republished by the event emitter.
///
/// The supertype snapshot captures the affected type's supertypes at event
/// time; by the time the event is processed the live declaration may already
/// differ, and the snapshot is what lets a cached closure classify the event
/// without re-querying mutated state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeEventKind,
    pub element: Element,
    pub declaring_type: Option<TypeHandle>,
    pub supertype_snapshot: Option<Vec<TypeHandle>>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeEventKind, element: Element) -> Self {
        let declaring_type = element
            .as_type()
            .and_then(|t| t.declaring_type())
            .cloned();
        Self {
            kind,
            element,
            declaring_type,
            supertype_snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Vec<TypeHandle>) -> Self {
        self.supertype_snapshot = Some(snapshot);
        self
    }

    pub fn buffer_dirty(unit: UnitId) -> Self {
        Self::new(ChangeEventKind::BufferDirty, Element::Unit(unit))
    }

    pub fn buffer_sync(unit: UnitId) -> Self {
        Self::new(ChangeEventKind::BufferSync, Element::Unit(unit))
    }

    /// Whether this is one of the synthetic working-copy transitions that
    /// only external subscribers see.
    pub fn is_buffer_transition(&self) -> bool {
        matches!(
            self.kind,
            ChangeEventKind::BufferDirty | ChangeEventKind::BufferSync
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_handle_inherits_unit_and_declaring_context() {
        let unit = UnitId::from("src/shapes.x");
        let outer = TypeHandle::primary(unit.clone(), "shapes.Outer");
        let inner = TypeHandle::nested(outer.clone(), "Inner");

        assert_eq!(inner.unit(), &unit);
        assert_eq!(inner.qualified_name(), "shapes.Outer.Inner");
        assert_eq!(inner.simple_name(), "Inner");
        assert_eq!(inner.declaring_type(), Some(&outer));
        assert!(!inner.is_primary());
        assert!(outer.is_primary());
    }

    #[test]
    fn handle_identity_is_name_plus_context() {
        let unit = UnitId::from("a.x");
        let t1 = TypeHandle::primary(unit.clone(), "p.T");
        let t2 = TypeHandle::primary(unit.clone(), "p.T");
        let other = TypeHandle::primary(UnitId::from("b.x"), "p.T");

        assert_eq!(t1, t2);
        assert_ne!(t1, other);
    }

    #[test]
    fn element_owning_unit_follows_owner() {
        let unit = UnitId::from("src/m.x");
        let t = TypeHandle::primary(unit.clone(), "m.T");
        let member = Element::Member {
            owner: t.clone(),
            name: "run".to_string(),
        };

        assert_eq!(member.owning_unit(), &unit);
        assert_eq!(member.kind(), ElementKind::Member);
        assert!(member.as_type().is_none());
        assert_eq!(Element::Type(t).kind(), ElementKind::Type);
    }

    #[test]
    fn change_event_captures_declaring_type() {
        let outer = TypeHandle::primary(UnitId::from("u.x"), "p.Outer");
        let inner = TypeHandle::nested(outer.clone(), "Inner");
        let event = ChangeEvent::new(ChangeEventKind::Added, Element::Type(inner));

        assert_eq!(event.declaring_type.as_ref(), Some(&outer));
        assert!(!event.is_buffer_transition());
        assert!(ChangeEvent::buffer_dirty(UnitId::from("u.x")).is_buffer_transition());
    }
}
