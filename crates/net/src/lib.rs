#![warn(missing_docs)]
//! Network encoding of component patches.
//!
//! Provides the plain and length-delimited wire forms, their configuration,
//! and a cache of encoded values for components that opt into it.

pub mod codec;
pub mod config;
pub mod encode_cache;
pub mod error;

pub use codec::{
    decode_patch, decode_patch_delimited, encode_patch, encode_patch_delimited, PatchWireCodec,
    WireFormat,
};
pub use config::{WireCodecConfig, DEFAULT_MAX_PREALLOCATED_ENTRIES};
pub use encode_cache::EncodeCache;
pub use error::WireError;
