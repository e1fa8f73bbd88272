#![warn(missing_docs)]
//! Layered data components.
//!
//! Entities carry an immutable prototype of typed components plus a sparse
//! patch of overrides and removals. [`core`] holds the in-memory model and the
//! persistent codec; [`net`] holds the wire codec.

pub use mdcomponents_core as core;
pub use mdcomponents_net as net;

/// Common imports for component consumers.
pub mod prelude {
    pub use mdcomponents_core::{
        composite, empty_map, filter, Component, ComponentFlags, ComponentGetter, ComponentMap,
        ComponentMapBuilder, ComponentPatch, ComponentPredicate, ComponentRegistry, ComponentType,
        PatchedComponentMap, SharedComponentMap, TypedComponent,
    };
    pub use mdcomponents_net::{PatchWireCodec, WireCodecConfig, WireFormat};
}
