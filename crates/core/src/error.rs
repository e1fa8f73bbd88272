//! Error types surfaced by registries and codecs.

use thiserror::Error;

use crate::registry::RegistryKey;

/// Error returned when parsing an invalid [`RegistryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RegistryKeyError {
    message: String,
}

impl RegistryKeyError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised while populating a [`ComponentRegistry`](crate::ComponentRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The identifier failed validation.
    #[error(transparent)]
    InvalidKey(#[from] RegistryKeyError),
    /// Another component already uses this identifier.
    #[error("component {0} is already registered")]
    DuplicateName(RegistryKey),
}

/// Failures while encoding or decoding component values and patches.
#[derive(Debug, Error)]
pub enum ComponentCodecError {
    /// A persisted identifier does not resolve to a registered component.
    #[error("no component with type {0}")]
    UnknownComponent(String),
    /// A persisted identifier resolves to a transient component.
    #[error("{0} is not a persistent component")]
    NotPersistent(String),
    /// A key used by a patch or map is not known to the registry.
    #[error("unregistered component: {0}")]
    Unregistered(String),
    /// The persistent document is not a JSON object.
    #[error("expected a component map object, found {0}")]
    NotAnObject(&'static str),
    /// A codec produced or received a value of the wrong type.
    #[error("value for {component} has type {found}, expected {expected}")]
    ValueType {
        /// Component whose codec was invoked.
        component: String,
        /// Declared value type.
        expected: &'static str,
        /// Type actually handed over.
        found: String,
    },
    /// JSON (de)serialization of a value failed.
    #[error("failed to convert component value: {0}")]
    Json(#[from] serde_json::Error),
    /// Binary (de)serialization of a value failed.
    #[error("failed to encode component value: {0}")]
    Binary(#[from] postcard::Error),
}
