//! Wire encoding of component patches.
//!
//! Frame layout (all integers are postcard varints):
//!
//! ```text
//! header  := added_count removed_count
//! added   := network_id value            ; repeated added_count times
//! removed := network_id                  ; repeated removed_count times
//! ```
//!
//! In [`WireFormat::LengthDelimited`] every value is preceded by its byte
//! length, which lets a reader step over components it cannot resolve
//! without losing its place in the stream.

use std::num::NonZeroUsize;

use mdcomponents_core::{
    ComponentCodecError, ComponentPatch, ComponentRegistry, ComponentValue, ErasedComponentType,
    RegistryEntry,
};
use tracing::{trace, warn};

use crate::config::WireCodecConfig;
use crate::encode_cache::EncodeCache;
use crate::error::WireError;

/// Value framing used by a [`PatchWireCodec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Values follow their keys directly.
    Plain,
    /// Each value is prefixed with its byte length.
    LengthDelimited,
}

/// Reads and writes component patches for the network.
pub struct PatchWireCodec {
    format: WireFormat,
    config: WireCodecConfig,
    cache: Option<EncodeCache>,
}

impl PatchWireCodec {
    /// Create a codec with default configuration.
    pub fn new(format: WireFormat) -> Self {
        Self::with_config(format, WireCodecConfig::default())
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(format: WireFormat, config: WireCodecConfig) -> Self {
        let cache = NonZeroUsize::new(config.encode_cache_capacity).map(EncodeCache::new);
        Self {
            format,
            config,
            cache,
        }
    }

    /// Framing used by this codec.
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Active configuration.
    pub fn config(&self) -> &WireCodecConfig {
        &self.config
    }

    /// Encoding cache, if enabled.
    pub fn cache(&self) -> Option<&EncodeCache> {
        self.cache.as_ref()
    }

    /// Append the encoding of `patch` to `out`.
    ///
    /// On error `out` is left as it was on entry.
    pub fn encode(
        &mut self,
        registry: &ComponentRegistry,
        patch: &ComponentPatch,
        out: &mut Vec<u8>,
    ) -> Result<(), WireError> {
        let start = out.len();
        let result = self.encode_entries(registry, patch, out);
        if result.is_err() {
            out.truncate(start);
        }
        result
    }

    fn encode_entries(
        &mut self,
        registry: &ComponentRegistry,
        patch: &ComponentPatch,
        out: &mut Vec<u8>,
    ) -> Result<(), WireError> {
        let added = patch.iter().filter(|(_, entry)| entry.is_some()).count();
        let removed = patch.len() - added;
        write_varint(count_to_u32(added), out)?;
        write_varint(count_to_u32(removed), out)?;
        if patch.is_empty() {
            return Ok(());
        }

        for (ty, entry) in patch.iter() {
            if let Some(value) = entry {
                let registered = registered(registry, ty)?;
                write_varint(registered.network_id(), out)?;
                self.encode_value(registered, value, out)?;
            }
        }
        for (ty, entry) in patch.iter() {
            if entry.is_none() {
                write_varint(registered(registry, ty)?.network_id(), out)?;
            }
        }
        trace!(added, removed, bytes = out.len(), "encoded component patch");
        Ok(())
    }

    fn encode_value(
        &mut self,
        registered: &RegistryEntry,
        value: &ComponentValue,
        out: &mut Vec<u8>,
    ) -> Result<(), WireError> {
        let ty = registered.component();
        let codec = registered.codec();
        match (&mut self.cache, ty.caches_encoding()) {
            (Some(cache), true) => {
                let bytes = cache
                    .get_or_encode(ty, value, |buf| codec.encode_bytes(value.as_ref(), buf))?;
                write_payload(self.format, bytes, out)
            }
            _ => match self.format {
                WireFormat::Plain => Ok(codec.encode_bytes(value.as_ref(), out)?),
                WireFormat::LengthDelimited => {
                    let mut buf = Vec::new();
                    codec.encode_bytes(value.as_ref(), &mut buf)?;
                    write_payload(self.format, &buf, out)
                }
            },
        }
    }

    /// Read one patch from the front of `input`, returning the unread rest.
    pub fn decode<'a>(
        &self,
        registry: &ComponentRegistry,
        input: &'a [u8],
    ) -> Result<(ComponentPatch, &'a [u8]), WireError> {
        let (added, rest) = read_varint(input)?;
        let (removed, mut rest) = read_varint(rest)?;
        if added == 0 && removed == 0 {
            return Ok((ComponentPatch::empty(), rest));
        }

        let declared = (added as usize).saturating_add(removed as usize);
        let mut entries: Vec<(ErasedComponentType, Option<ComponentValue>)> =
            Vec::with_capacity(declared.min(self.config.max_preallocated_entries));

        for _ in 0..added {
            let (network_id, after_key) = read_varint(rest)?;
            let (value, after_value) = self.decode_value(registry, network_id, after_key)?;
            rest = after_value;
            if let Some((ty, value)) = value {
                entries.push((ty, Some(value)));
            }
        }
        for _ in 0..removed {
            let (network_id, after_key) = read_varint(rest)?;
            rest = after_key;
            match registry.by_network_id(network_id) {
                Some(registered) => entries.push((registered.component(), None)),
                None if self.format == WireFormat::LengthDelimited => {
                    warn!(network_id, "skipping removal of unknown component");
                }
                None => return Err(WireError::UnknownNetworkId(network_id)),
            }
        }

        let mut builder = ComponentPatch::builder();
        for (ty, entry) in entries {
            match entry {
                Some(value) => builder.set_raw(ty, value),
                None => builder.remove_raw(ty),
            };
        }
        trace!(added, removed, "decoded component patch");
        Ok((builder.build(), rest))
    }

    fn decode_value<'a>(
        &self,
        registry: &ComponentRegistry,
        network_id: u32,
        input: &'a [u8],
    ) -> Result<(Option<(ErasedComponentType, ComponentValue)>, &'a [u8]), WireError> {
        match self.format {
            WireFormat::Plain => {
                let registered = registry
                    .by_network_id(network_id)
                    .ok_or(WireError::UnknownNetworkId(network_id))?;
                let (value, rest) = registered.codec().decode_bytes(input)?;
                let value = registered.check_decoded(value)?;
                Ok((Some((registered.component(), value)), rest))
            }
            WireFormat::LengthDelimited => {
                let (len, rest) = read_varint(input)?;
                let len = len as usize;
                if len > rest.len() {
                    return Err(WireError::Truncated {
                        needed: len,
                        available: rest.len(),
                    });
                }
                let (payload, rest) = rest.split_at(len);
                let Some(registered) = registry.by_network_id(network_id) else {
                    warn!(network_id, bytes = len, "skipping value of unknown component");
                    return Ok((None, rest));
                };
                let (value, unread) = registered.codec().decode_bytes(payload)?;
                if !unread.is_empty() {
                    return Err(WireError::PayloadLength {
                        component: registered.name().to_string(),
                        unread: unread.len(),
                    });
                }
                let value = registered.check_decoded(value)?;
                Ok((Some((registered.component(), value)), rest))
            }
        }
    }
}

fn registered(
    registry: &ComponentRegistry,
    ty: ErasedComponentType,
) -> Result<&RegistryEntry, ComponentCodecError> {
    registry
        .entry(ty)
        .ok_or_else(|| ComponentCodecError::Unregistered(format!("{ty:?}")))
}

fn count_to_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn write_varint(value: u32, out: &mut Vec<u8>) -> Result<(), WireError> {
    let bytes = postcard::to_allocvec(&value).map_err(WireError::Varint)?;
    out.extend_from_slice(&bytes);
    Ok(())
}

fn read_varint(input: &[u8]) -> Result<(u32, &[u8]), WireError> {
    postcard::take_from_bytes::<u32>(input).map_err(WireError::Varint)
}

fn write_payload(format: WireFormat, bytes: &[u8], out: &mut Vec<u8>) -> Result<(), WireError> {
    if format == WireFormat::LengthDelimited {
        write_varint(count_to_u32(bytes.len()), out)?;
    }
    out.extend_from_slice(bytes);
    Ok(())
}

fn decode_whole(
    format: WireFormat,
    registry: &ComponentRegistry,
    bytes: &[u8],
) -> Result<ComponentPatch, WireError> {
    let (patch, rest) = PatchWireCodec::new(format).decode(registry, bytes)?;
    if !rest.is_empty() {
        return Err(WireError::TrailingBytes(rest.len()));
    }
    Ok(patch)
}

/// Encode a patch with plain value framing.
pub fn encode_patch(registry: &ComponentRegistry, patch: &ComponentPatch) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    PatchWireCodec::new(WireFormat::Plain).encode(registry, patch, &mut out)?;
    Ok(out)
}

/// Decode a plain-framed patch occupying all of `bytes`.
pub fn decode_patch(registry: &ComponentRegistry, bytes: &[u8]) -> Result<ComponentPatch, WireError> {
    decode_whole(WireFormat::Plain, registry, bytes)
}

/// Encode a patch with length-delimited values.
pub fn encode_patch_delimited(
    registry: &ComponentRegistry,
    patch: &ComponentPatch,
) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    PatchWireCodec::new(WireFormat::LengthDelimited).encode(registry, patch, &mut out)?;
    Ok(out)
}

/// Decode a length-delimited patch occupying all of `bytes`.
pub fn decode_patch_delimited(
    registry: &ComponentRegistry,
    bytes: &[u8],
) -> Result<ComponentPatch, WireError> {
    decode_whole(WireFormat::LengthDelimited, registry, bytes)
}
