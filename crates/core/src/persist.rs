//! Persistent encoding of component maps and patches.
//!
//! Documents are JSON objects keyed by component identifier. In a patch a
//! bare identifier sets the component and a `!`-prefixed identifier removes
//! it; removal entries carry an empty object as their payload. Transient
//! components are never written and are rejected when read back.

use serde_json::{Map, Value};

use crate::component::ErasedComponentType;
use crate::error::ComponentCodecError;
use crate::map::{ComponentMap, ComponentMapBuilder, SharedComponentMap};
use crate::patch::ComponentPatch;
use crate::registry::{ComponentRegistry, RegistryEntry};

/// Prefix marking a removal entry in a persisted patch.
pub const REMOVED_PREFIX: char = '!';

/// Persisted form of a map or patch.
pub type ComponentDocument = Map<String, Value>;

fn registered(
    registry: &ComponentRegistry,
    ty: ErasedComponentType,
) -> Result<&RegistryEntry, ComponentCodecError> {
    registry
        .entry(ty)
        .ok_or_else(|| ComponentCodecError::Unregistered(format!("{ty:?}")))
}

fn resolve_persistent<'r>(
    registry: &'r ComponentRegistry,
    id: &str,
) -> Result<&'r RegistryEntry, ComponentCodecError> {
    let entry = registry
        .get_by_str(id)
        .ok_or_else(|| ComponentCodecError::UnknownComponent(id.to_string()))?;
    if entry.component().is_transient() {
        return Err(ComponentCodecError::NotPersistent(id.to_string()));
    }
    Ok(entry)
}

/// Encode a patch; transient entries are skipped.
pub fn encode_patch(
    registry: &ComponentRegistry,
    patch: &ComponentPatch,
) -> Result<ComponentDocument, ComponentCodecError> {
    let mut document = ComponentDocument::new();
    for (ty, entry) in patch.iter() {
        if ty.is_transient() {
            continue;
        }
        let registered = registered(registry, ty)?;
        match entry {
            Some(value) => {
                let payload = registered.codec().encode_json(value.as_ref())?;
                document.insert(registered.name().to_string(), payload);
            }
            None => {
                document.insert(
                    format!("{REMOVED_PREFIX}{}", registered.name()),
                    Value::Object(Map::new()),
                );
            }
        }
    }
    Ok(document)
}

/// Decode a patch. Fails without side effects on the first bad entry.
pub fn decode_patch(
    registry: &ComponentRegistry,
    document: &ComponentDocument,
) -> Result<ComponentPatch, ComponentCodecError> {
    let mut builder = ComponentPatch::builder();
    for (key, payload) in document {
        match key.strip_prefix(REMOVED_PREFIX) {
            Some(id) => {
                let entry = resolve_persistent(registry, id)?;
                builder.remove_raw(entry.component());
            }
            None => {
                let entry = resolve_persistent(registry, key)?;
                let value = entry.check_decoded(entry.codec().decode_json(payload)?)?;
                builder.set_raw(entry.component(), value);
            }
        }
    }
    Ok(builder.build())
}

/// Encode every persistent component of `map`.
pub fn encode_map(
    registry: &ComponentRegistry,
    map: &dyn ComponentMap,
) -> Result<ComponentDocument, ComponentCodecError> {
    let mut document = ComponentDocument::new();
    for component in map.iter() {
        let ty = component.ty();
        if ty.is_transient() {
            continue;
        }
        let registered = registered(registry, ty)?;
        let payload = registered
            .codec()
            .encode_json(component.raw_value().as_ref())?;
        document.insert(registered.name().to_string(), payload);
    }
    Ok(document)
}

/// Decode a map written by [`encode_map`].
pub fn decode_map(
    registry: &ComponentRegistry,
    document: &ComponentDocument,
) -> Result<SharedComponentMap, ComponentCodecError> {
    let mut builder = ComponentMapBuilder::new();
    for (id, payload) in document {
        let entry = resolve_persistent(registry, id)?;
        let value = entry.check_decoded(entry.codec().decode_json(payload)?)?;
        builder.set_raw(entry.component(), Some(value));
    }
    Ok(builder.build())
}

fn as_document(value: Value) -> Result<ComponentDocument, ComponentCodecError> {
    match value {
        Value::Object(document) => Ok(document),
        Value::Null => Err(ComponentCodecError::NotAnObject("null")),
        Value::Bool(_) => Err(ComponentCodecError::NotAnObject("a boolean")),
        Value::Number(_) => Err(ComponentCodecError::NotAnObject("a number")),
        Value::String(_) => Err(ComponentCodecError::NotAnObject("a string")),
        Value::Array(_) => Err(ComponentCodecError::NotAnObject("an array")),
    }
}

/// Encode a patch as JSON bytes.
pub fn patch_to_vec(
    registry: &ComponentRegistry,
    patch: &ComponentPatch,
) -> Result<Vec<u8>, ComponentCodecError> {
    Ok(serde_json::to_vec(&encode_patch(registry, patch)?)?)
}

/// Decode a patch from JSON bytes.
pub fn patch_from_slice(
    registry: &ComponentRegistry,
    bytes: &[u8],
) -> Result<ComponentPatch, ComponentCodecError> {
    let document = as_document(serde_json::from_slice(bytes)?)?;
    decode_patch(registry, &document)
}

/// Encode a map as JSON bytes.
pub fn map_to_vec(
    registry: &ComponentRegistry,
    map: &dyn ComponentMap,
) -> Result<Vec<u8>, ComponentCodecError> {
    Ok(serde_json::to_vec(&encode_map(registry, map)?)?)
}

/// Decode a map from JSON bytes.
pub fn map_from_slice(
    registry: &ComponentRegistry,
    bytes: &[u8],
) -> Result<SharedComponentMap, ComponentCodecError> {
    let document = as_document(serde_json::from_slice(bytes)?)?;
    decode_map(registry, &document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ComponentCodec;
    use crate::component::{ComponentData, ComponentFlags, ComponentType, ComponentValue};
    use std::sync::Arc;
    use crate::map::ComponentGetter;
    use serde_json::json;

    struct Fixture {
        registry: ComponentRegistry,
        size: ComponentType<u32>,
        lore: ComponentType<Vec<String>>,
        lock: ComponentType<bool>,
    }

    fn fixture() -> Fixture {
        let mut registry = ComponentRegistry::new();
        let size = registry
            .register("max_stack_size", ComponentFlags::empty())
            .unwrap();
        let lore = registry.register("lore", ComponentFlags::empty()).unwrap();
        let lock = registry
            .register("creative_slot_lock", ComponentFlags::TRANSIENT)
            .unwrap();
        Fixture {
            registry,
            size,
            lore,
            lock,
        }
    }

    #[test]
    fn encodes_sets_and_removals() {
        let f = fixture();
        let patch = ComponentPatch::builder()
            .set(f.size, 16)
            .remove(f.lore)
            .set(f.lock, true)
            .build();

        let document = encode_patch(&f.registry, &patch).unwrap();
        assert_eq!(
            Value::Object(document),
            json!({ "mdm:max_stack_size": 16, "!mdm:lore": {} })
        );
    }

    #[test]
    fn decodes_what_it_encodes() {
        let f = fixture();
        let patch = ComponentPatch::builder()
            .set(f.lore, vec!["Forged in lava".to_string()])
            .remove(f.size)
            .build();

        let bytes = patch_to_vec(&f.registry, &patch).unwrap();
        assert_eq!(patch_from_slice(&f.registry, &bytes).unwrap(), patch);
    }

    #[test]
    fn unknown_ids_are_errors() {
        let f = fixture();
        let err = patch_from_slice(&f.registry, br#"{"mdm:nope": 1}"#).unwrap_err();
        assert_eq!(err.to_string(), "no component with type mdm:nope");

        let err = patch_from_slice(&f.registry, br#"{"!mdm:nope": {}}"#).unwrap_err();
        assert_eq!(err.to_string(), "no component with type mdm:nope");
    }

    #[test]
    fn transient_ids_are_errors() {
        let f = fixture();
        let err = patch_from_slice(&f.registry, br#"{"mdm:creative_slot_lock": true}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "mdm:creative_slot_lock is not a persistent component"
        );

        let err = patch_from_slice(&f.registry, br#"{"!mdm:creative_slot_lock": {}}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "mdm:creative_slot_lock is not a persistent component"
        );
    }

    /// Decodes every payload as a string, whatever the component declares.
    struct MislabeledCodec;

    impl ComponentCodec for MislabeledCodec {
        fn encode_json(&self, _value: &dyn ComponentData) -> Result<Value, ComponentCodecError> {
            Ok(Value::Null)
        }

        fn decode_json(&self, _payload: &Value) -> Result<ComponentValue, ComponentCodecError> {
            Ok(Arc::new("oops".to_string()))
        }

        fn encode_bytes(&self, _value: &dyn ComponentData, _out: &mut Vec<u8>) -> Result<(), ComponentCodecError> {
            Ok(())
        }

        fn decode_bytes<'a>(&self, input: &'a [u8]) -> Result<(ComponentValue, &'a [u8]), ComponentCodecError> {
            Ok((Arc::new("oops".to_string()), input))
        }
    }

    #[test]
    fn mistyped_decoded_values_are_errors() {
        let mut registry = ComponentRegistry::new();
        registry
            .register_with_codec::<u32, _>("damage", ComponentFlags::empty(), MislabeledCodec)
            .unwrap();

        let err = patch_from_slice(&registry, br#"{"mdm:damage": 3}"#).unwrap_err();
        assert!(matches!(err, ComponentCodecError::ValueType { .. }));
        let err = map_from_slice(&registry, br#"{"mdm:damage": 3}"#).unwrap_err();
        assert!(matches!(err, ComponentCodecError::ValueType { .. }));
    }

    #[test]
    fn unregistered_keys_fail_to_encode() {
        let f = fixture();
        let stray = ComponentType::<u8>::new(ComponentFlags::empty());
        let patch = ComponentPatch::builder().set(stray, 1).build();
        let err = encode_patch(&f.registry, &patch).unwrap_err();
        assert!(err.to_string().starts_with("unregistered component: "));
    }

    #[test]
    fn bad_payload_is_an_error() {
        let f = fixture();
        assert!(patch_from_slice(&f.registry, br#"{"mdm:max_stack_size": "many"}"#).is_err());
        assert!(matches!(
            patch_from_slice(&f.registry, b"[]"),
            Err(ComponentCodecError::NotAnObject(_))
        ));
    }

    #[test]
    fn maps_roundtrip_without_transients() {
        let f = fixture();
        let map = ComponentMapBuilder::new()
            .set(f.size, 64)
            .set(f.lock, true)
            .build();
        let bytes = map_to_vec(&f.registry, map.as_ref()).unwrap();
        let decoded = map_from_slice(&f.registry, &bytes).unwrap();
        assert_eq!(decoded.get(f.size), Some(&64));
        assert!(!decoded.has(f.lock));
        assert_eq!(decoded.len(), 1);
    }
}
