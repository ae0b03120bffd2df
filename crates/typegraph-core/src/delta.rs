use crate::{ChangeEvent, ChangeEventKind, Element, TypeHandle};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeltaKind {
    Added,
    Removed,
    Changed,
}

/// One node of the structural change tree a declaration store reports.
///
/// A delta with children is a composite ("children of this element changed")
/// and is walked recursively; only leaves describe an actual mutation. The
/// supertype snapshot on a type-level leaf records the affected type's
/// supertypes as they were at mutation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDelta {
    pub kind: DeltaKind,
    pub element: Element,
    pub supertype_snapshot: Option<Vec<TypeHandle>>,
    pub children: Vec<StoreDelta>,
}

impl StoreDelta {
    pub fn leaf(kind: DeltaKind, element: Element) -> Self {
        Self {
            kind,
            element,
            supertype_snapshot: None,
            children: Vec::new(),
        }
    }

    /// Composite node: the element itself is unchanged, its children carry
    /// the mutations.
    pub fn composite(element: Element, children: Vec<StoreDelta>) -> Self {
        Self {
            kind: DeltaKind::Changed,
            element,
            supertype_snapshot: None,
            children,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Vec<TypeHandle>) -> Self {
        self.supertype_snapshot = Some(snapshot);
        self
    }

    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }

    /// Normalize a leaf delta into the event republished downstream.
    pub fn to_event(&self) -> ChangeEvent {
        let kind = match self.kind {
            DeltaKind::Added => ChangeEventKind::Added,
            DeltaKind::Removed => ChangeEventKind::Removed,
            DeltaKind::Changed => ChangeEventKind::Changed,
        };
        let mut event = ChangeEvent::new(kind, self.element.clone());
        event.supertype_snapshot = self.supertype_snapshot.clone();
        event
    }
}
