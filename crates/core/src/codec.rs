//! Per-component value codecs.
//!
//! Each registered component owns one [`ComponentCodec`]. The patch codecs
//! delegate value payloads to it and never look inside them.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::component::{Component, ComponentData, ComponentValue};
use crate::error::ComponentCodecError;

/// Encodes and decodes the values of a single component type.
pub trait ComponentCodec: Send + Sync {
    /// Convert a value into its persistent JSON payload.
    fn encode_json(&self, value: &dyn ComponentData) -> Result<serde_json::Value, ComponentCodecError>;

    /// Rebuild a value from its persistent JSON payload.
    fn decode_json(&self, payload: &serde_json::Value) -> Result<ComponentValue, ComponentCodecError>;

    /// Append the binary payload of a value to `out`.
    fn encode_bytes(&self, value: &dyn ComponentData, out: &mut Vec<u8>) -> Result<(), ComponentCodecError>;

    /// Read one value from the front of `input`, returning the unread rest.
    fn decode_bytes<'a>(&self, input: &'a [u8]) -> Result<(ComponentValue, &'a [u8]), ComponentCodecError>;
}

/// Codec for any serde-capable value: JSON for persistence, postcard on the wire.
pub struct SerdeCodec<T>(PhantomData<fn() -> T>);

impl<T> SerdeCodec<T> {
    /// Create the codec.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerdeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerdeCodec<{}>", std::any::type_name::<T>())
    }
}

impl<T: Component + Serialize + DeserializeOwned> SerdeCodec<T> {
    fn typed<'v>(&self, value: &'v dyn ComponentData) -> Result<&'v T, ComponentCodecError> {
        value
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| ComponentCodecError::ValueType {
                component: format!("{self:?}"),
                expected: std::any::type_name::<T>(),
                found: format!("{value:?}"),
            })
    }
}

impl<T: Component + Serialize + DeserializeOwned> ComponentCodec for SerdeCodec<T> {
    fn encode_json(&self, value: &dyn ComponentData) -> Result<serde_json::Value, ComponentCodecError> {
        Ok(serde_json::to_value(self.typed(value)?)?)
    }

    fn decode_json(&self, payload: &serde_json::Value) -> Result<ComponentValue, ComponentCodecError> {
        let value: T = T::deserialize(payload)?;
        Ok(Arc::new(value))
    }

    fn encode_bytes(&self, value: &dyn ComponentData, out: &mut Vec<u8>) -> Result<(), ComponentCodecError> {
        let bytes = postcard::to_allocvec(self.typed(value)?)?;
        out.extend_from_slice(&bytes);
        Ok(())
    }

    fn decode_bytes<'a>(&self, input: &'a [u8]) -> Result<(ComponentValue, &'a [u8]), ComponentCodecError> {
        let (value, rest) = postcard::take_from_bytes::<T>(input)?;
        Ok((Arc::new(value), rest))
    }
}
