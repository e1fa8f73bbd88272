#![warn(missing_docs)]
//! Layered data components: immutable prototypes, sparse patches and the
//! copy-on-write maps that combine them.

pub mod codec;
pub mod component;
pub mod error;
pub mod map;
pub mod patch;
pub mod patched;
pub mod persist;
pub mod predicate;
pub mod registry;

// Re-export commonly used types
pub use codec::{ComponentCodec, SerdeCodec};
pub use component::{
    Component, ComponentData, ComponentFlags, ComponentId, ComponentType, ComponentValue,
    ErasedComponentType, TypedComponent,
};
pub use error::{ComponentCodecError, RegistryError, RegistryKeyError};
pub use map::{
    composite, empty_map, filter, maps_equal, ComponentGetter, ComponentMap, ComponentMapBuilder,
    SharedComponentMap,
};
pub use patch::{ComponentPatch, ComponentPatchBuilder, SplitResult};
pub use patched::PatchedComponentMap;
pub use predicate::{ComponentPredicate, ComponentPredicateBuilder};
pub use registry::{ComponentRegistry, RegistryEntry, RegistryKey, DEFAULT_NAMESPACE};
