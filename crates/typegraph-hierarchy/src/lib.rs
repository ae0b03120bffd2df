pub mod collector;
pub mod emitter;
pub mod primary;
pub mod propagation;
pub mod registry;
pub mod result;

pub use collector::*;
pub use emitter::*;
pub use primary::*;
pub use propagation::*;
pub use registry::*;
pub use result::*;

// Re-export common types for convenience
pub use typegraph_core::{
    ChangeEvent, ChangeEventKind, ChangeListener, DeclarationStore, Element, HierarchyConfig,
    HierarchyListener, Result, TypeGraphError, TypeHandle, TypeKind, UnitId,
};
