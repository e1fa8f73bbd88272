//! Namespaced component identifiers and the component registry.
//!
//! Identifiers are stable strings of the form `namespace:path` (e.g.
//! `mdm:max_stack_size`). The registry binds each identifier to exactly one
//! [`ComponentType`], its value codec and a dense network id.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{ComponentCodec, SerdeCodec};
use crate::component::{
    Component, ComponentFlags, ComponentId, ComponentType, ComponentValue, ErasedComponentType,
};
use crate::error::{ComponentCodecError, RegistryError, RegistryKeyError};

/// Default namespace used when an identifier omits an explicit namespace.
pub const DEFAULT_NAMESPACE: &str = "mdm";

/// A namespaced identifier of the form `namespace:path`.
///
/// Ordering is lexical by `(namespace, path)` and is stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryKey {
    namespace: String,
    path: String,
}

impl RegistryKey {
    /// Parse an identifier, accepting `namespace:path` or a bare `path`
    /// (which uses [`DEFAULT_NAMESPACE`]).
    pub fn parse(input: &str) -> Result<Self, RegistryKeyError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RegistryKeyError::new("RegistryKey cannot be empty"));
        }

        let (namespace, path) = input
            .split_once(':')
            .unwrap_or((DEFAULT_NAMESPACE, input));

        validate_namespace(namespace)?;
        validate_path(path)?;

        Ok(Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    /// Identifier namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Identifier path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl FromStr for RegistryKey {
    type Err = RegistryKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn validate_namespace(ns: &str) -> Result<(), RegistryKeyError> {
    if ns.is_empty() {
        return Err(RegistryKeyError::new("RegistryKey namespace cannot be empty"));
    }
    if ns.len() > 64 {
        return Err(RegistryKeyError::new("RegistryKey namespace too long (max 64)"));
    }
    if !ns
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '-' | '.'))
    {
        return Err(RegistryKeyError::new(
            "RegistryKey namespace has invalid characters (allowed: a-z0-9_.-)",
        ));
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<(), RegistryKeyError> {
    if path.is_empty() {
        return Err(RegistryKeyError::new("RegistryKey path cannot be empty"));
    }
    if path.len() > 128 {
        return Err(RegistryKeyError::new("RegistryKey path too long (max 128)"));
    }
    if !path
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '-' | '.' | '/'))
    {
        return Err(RegistryKeyError::new(
            "RegistryKey path has invalid characters (allowed: a-z0-9_./-)",
        ));
    }
    Ok(())
}

/// A registered component: identifier, key, codec and network id.
pub struct RegistryEntry {
    name: RegistryKey,
    component: ErasedComponentType,
    network_id: u32,
    codec: Box<dyn ComponentCodec>,
}

impl RegistryEntry {
    /// Stable string identifier.
    pub fn name(&self) -> &RegistryKey {
        &self.name
    }

    /// The component key.
    pub fn component(&self) -> ErasedComponentType {
        self.component
    }

    /// Dense id used by the wire codec.
    pub fn network_id(&self) -> u32 {
        self.network_id
    }

    /// Value codec for this component.
    pub fn codec(&self) -> &dyn ComponentCodec {
        self.codec.as_ref()
    }

    /// Pass `value` through if it has the component's declared type.
    ///
    /// Guards decoders against codecs that hand back a value of another type.
    pub fn check_decoded(&self, value: ComponentValue) -> Result<ComponentValue, ComponentCodecError> {
        if self.component.accepts(value.as_ref()) {
            Ok(value)
        } else {
            Err(ComponentCodecError::ValueType {
                component: self.name.to_string(),
                expected: self.component.type_name(),
                found: format!("{value:?}"),
            })
        }
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .field("component", &self.component)
            .field("network_id", &self.network_id)
            .finish_non_exhaustive()
    }
}

/// Maps string identifiers and network ids to component keys.
///
/// Populated once at bootstrap and read-only afterwards.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    entries: Vec<RegistryEntry>,
    by_name: HashMap<RegistryKey, usize>,
    by_component: HashMap<ComponentId, usize>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a serde-capable component under `name`.
    pub fn register<T>(&mut self, name: &str, flags: ComponentFlags) -> Result<ComponentType<T>, RegistryError>
    where
        T: Component + Serialize + DeserializeOwned,
    {
        self.register_with_codec(name, flags, SerdeCodec::<T>::new())
    }

    /// Register a component whose values are handled by a custom codec.
    pub fn register_with_codec<T, C>(
        &mut self,
        name: &str,
        flags: ComponentFlags,
        codec: C,
    ) -> Result<ComponentType<T>, RegistryError>
    where
        T: Component,
        C: ComponentCodec + 'static,
    {
        let name = RegistryKey::parse(name)?;
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let ty = ComponentType::<T>::new(flags);
        let index = self.entries.len();
        let network_id = u32::try_from(index).unwrap_or(u32::MAX);
        debug!(component = %name, network_id, ?flags, "registered component");

        self.by_name.insert(name.clone(), index);
        self.by_component.insert(ty.id(), index);
        self.entries.push(RegistryEntry {
            name,
            component: ty.erased(),
            network_id,
            codec: Box::new(codec),
        });
        Ok(ty)
    }

    /// Look up a component by identifier.
    pub fn get(&self, name: &RegistryKey) -> Option<&RegistryEntry> {
        self.by_name.get(name).map(|&index| &self.entries[index])
    }

    /// Look up a component by its string form; unparsable strings miss.
    pub fn get_by_str(&self, name: &str) -> Option<&RegistryEntry> {
        RegistryKey::parse(name).ok().and_then(|name| self.get(&name))
    }

    /// Look up the entry describing `component`.
    pub fn entry(&self, component: impl Into<ErasedComponentType>) -> Option<&RegistryEntry> {
        let component = component.into();
        self.by_component
            .get(&component.id())
            .map(|&index| &self.entries[index])
    }

    /// Look up a component by network id.
    pub fn by_network_id(&self, network_id: u32) -> Option<&RegistryEntry> {
        self.entries.get(usize::try_from(network_id).ok()?)
    }

    /// Network id of `component`, if registered.
    pub fn network_id(&self, component: impl Into<ErasedComponentType>) -> Option<u32> {
        self.entry(component).map(RegistryEntry::network_id)
    }

    /// Iterate entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter()
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespaced_key() {
        let key = RegistryKey::parse("mdm:lore").unwrap();
        assert_eq!(key.namespace(), "mdm");
        assert_eq!(key.path(), "lore");
        assert_eq!(key.to_string(), "mdm:lore");
    }

    #[test]
    fn parses_with_default_namespace() {
        let key = RegistryKey::parse("custom_name").unwrap();
        assert_eq!(key.to_string(), "mdm:custom_name");
    }

    #[test]
    fn rejects_invalid_keys() {
        assert!(RegistryKey::parse("").is_err());
        assert!(RegistryKey::parse("   ").is_err());
        assert!(RegistryKey::parse("mdm:Lore").is_err());
        assert!(RegistryKey::parse("!mdm:lore").is_err());
        assert!(RegistryKey::parse("mdm:").is_err());
        assert!(RegistryKey::parse(":lore").is_err());
    }

    #[test]
    fn registers_and_resolves() {
        let mut registry = ComponentRegistry::new();
        let size = registry
            .register::<u32>("max_stack_size", ComponentFlags::empty())
            .unwrap();
        let lore = registry
            .register::<Vec<String>>("mdm:lore", ComponentFlags::empty())
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.network_id(size), Some(0));
        assert_eq!(registry.network_id(lore), Some(1));
        assert_eq!(
            registry.get_by_str("mdm:lore").map(RegistryEntry::component),
            Some(lore.erased())
        );
        assert_eq!(
            registry.by_network_id(0).map(|e| e.name().to_string()),
            Some("mdm:max_stack_size".to_string())
        );
        assert!(registry.by_network_id(2).is_none());
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = ComponentRegistry::new();
        registry.register::<u32>("damage", ComponentFlags::empty()).unwrap();
        let err = registry
            .register::<u32>("mdm:damage", ComponentFlags::empty())
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(_)));
    }

    #[test]
    fn foreign_keys_are_unregistered() {
        let registry = ComponentRegistry::new();
        let stray = ComponentType::<u8>::new(ComponentFlags::empty());
        assert!(registry.entry(stray).is_none());
        assert!(registry.network_id(stray).is_none());
    }
}
