//! Component keys and type-erased component values.
//!
//! A [`ComponentType<T>`] is a process-unique token that names one kind of
//! data attached to an entity, item or block. Keys compare by their interned
//! [`ComponentId`] only, so two keys created separately are never equal even
//! when they carry the same value type.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::patched::PatchedComponentMap;

static NEXT_COMPONENT_ID: AtomicU32 = AtomicU32::new(0);

/// Interned identity of a component key.
///
/// Ids are handed out from a global counter and never reused, which makes
/// accidental duplicate keys impossible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u32);

impl ComponentId {
    fn next() -> Self {
        Self(NEXT_COMPONENT_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Raw numeric value of the id.
    pub fn raw(self) -> u32 {
        self.0
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    /// Static behaviour flags attached to a component key.
    pub struct ComponentFlags: u8 {
        /// Never written to persistent storage, even when set.
        const TRANSIENT = 0b0000_0001;
        /// Encoded values may be memoised by the wire encoder.
        const CACHE_ENCODING = 0b0000_0010;
    }
}

/// Values that can be stored under a [`ComponentType`].
pub trait Component: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> Component for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// Object-safe view of a stored component value.
pub trait ComponentData: Any + fmt::Debug + Send + Sync {
    /// Upcast for downcasting to the concrete value type.
    fn as_any(&self) -> &dyn Any;

    /// Structural equality across the erased boundary. Values of different
    /// concrete types are never equal.
    fn dyn_eq(&self, other: &dyn ComponentData) -> bool;

    /// `TypeId` of the concrete value.
    fn value_type(&self) -> TypeId;
}

impl<T: Component> ComponentData for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn ComponentData) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn value_type(&self) -> TypeId {
        TypeId::of::<T>()
    }
}

/// Shared handle to an erased component value.
pub type ComponentValue = Arc<dyn ComponentData>;

/// Key with its value type erased.
///
/// Carries enough runtime type information to verify that values stored
/// under it have the declared type.
#[derive(Clone, Copy)]
pub struct ErasedComponentType {
    id: ComponentId,
    flags: ComponentFlags,
    value_type: TypeId,
    type_name: &'static str,
}

impl ErasedComponentType {
    /// Interned identity.
    pub fn id(self) -> ComponentId {
        self.id
    }

    /// Behaviour flags.
    pub fn flags(self) -> ComponentFlags {
        self.flags
    }

    /// Whether the component is excluded from persistent encodings.
    pub fn is_transient(self) -> bool {
        self.flags.contains(ComponentFlags::TRANSIENT)
    }

    /// Whether encoded values of this component may be memoised.
    pub fn caches_encoding(self) -> bool {
        self.flags.contains(ComponentFlags::CACHE_ENCODING)
    }

    /// Rust type name of the declared value type.
    pub fn type_name(self) -> &'static str {
        self.type_name
    }

    /// Whether `value` has this key's declared value type.
    pub fn accepts(self, value: &dyn ComponentData) -> bool {
        value.value_type() == self.value_type
    }

    /// Panics unless `value` has this key's declared value type.
    pub(crate) fn check_value(self, value: &dyn ComponentData) {
        assert!(
            self.accepts(value),
            "component {self:?} expects values of type {}, got {value:?}",
            self.type_name
        );
    }

    /// Re-establish the static value type of a value stored under this key.
    pub(crate) fn downcast<T: Component>(self, value: &dyn ComponentData) -> &T {
        match value.as_any().downcast_ref::<T>() {
            Some(value) => value,
            None => panic!(
                "component {self:?} read as {} but holds {value:?}",
                std::any::type_name::<T>()
            ),
        }
    }
}

impl PartialEq for ErasedComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ErasedComponentType {}

impl PartialOrd for ErasedComponentType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ErasedComponentType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for ErasedComponentType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ErasedComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}<{}>", self.id.0, self.type_name)
    }
}

/// Typed component key.
pub struct ComponentType<T> {
    erased: ErasedComponentType,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> ComponentType<T> {
    /// Create a brand-new key. Keys are normally created once at bootstrap,
    /// usually through [`ComponentRegistry::register`](crate::ComponentRegistry::register).
    pub fn new(flags: ComponentFlags) -> Self {
        Self {
            erased: ErasedComponentType {
                id: ComponentId::next(),
                flags,
                value_type: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
            },
            _marker: PhantomData,
        }
    }

    /// Recover the typed key from an erased one. Returns `None` when the
    /// erased key was declared with a different value type.
    pub fn from_erased(erased: ErasedComponentType) -> Option<Self> {
        (erased.value_type == TypeId::of::<T>()).then_some(Self {
            erased,
            _marker: PhantomData,
        })
    }
}

impl<T> ComponentType<T> {
    /// Erase the value type.
    pub fn erased(self) -> ErasedComponentType {
        self.erased
    }

    /// Interned identity.
    pub fn id(self) -> ComponentId {
        self.erased.id
    }

    /// Whether the component is excluded from persistent encodings.
    pub fn is_transient(self) -> bool {
        self.erased.is_transient()
    }

    /// Whether encoded values of this component may be memoised.
    pub fn caches_encoding(self) -> bool {
        self.erased.caches_encoding()
    }
}

impl<T> Clone for ComponentType<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ComponentType<T> {}

impl<T> PartialEq for ComponentType<T> {
    fn eq(&self, other: &Self) -> bool {
        self.erased == other.erased
    }
}

impl<T> Eq for ComponentType<T> {}

impl<T> Hash for ComponentType<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.erased.hash(state);
    }
}

impl<T> fmt::Debug for ComponentType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.erased, f)
    }
}

impl<T> From<ComponentType<T>> for ErasedComponentType {
    fn from(ty: ComponentType<T>) -> Self {
        ty.erased
    }
}

/// A key paired with a value of its declared type.
///
/// Produced on demand while iterating maps; never stored by them.
#[derive(Debug, Clone)]
pub struct TypedComponent {
    ty: ErasedComponentType,
    value: ComponentValue,
}

impl TypedComponent {
    /// Pair a typed key with a value.
    pub fn new<T: Component>(ty: ComponentType<T>, value: T) -> Self {
        Self {
            ty: ty.erased(),
            value: Arc::new(value),
        }
    }

    /// Pair an erased key with an erased value.
    ///
    /// # Panics
    /// If `value` does not have the key's declared type.
    pub fn from_raw(ty: ErasedComponentType, value: ComponentValue) -> Self {
        ty.check_value(value.as_ref());
        Self { ty, value }
    }

    /// The key.
    pub fn ty(&self) -> ErasedComponentType {
        self.ty
    }

    /// The erased value.
    pub fn raw_value(&self) -> &ComponentValue {
        &self.value
    }

    /// The value, if this component is keyed by `ty`.
    pub fn value<T: Component>(&self, ty: ComponentType<T>) -> Option<&T> {
        (self.ty == ty.erased()).then(|| self.ty.downcast::<T>(self.value.as_ref()))
    }

    /// Write this component into `map`.
    pub fn apply_to(&self, map: &mut PatchedComponentMap) {
        map.set_raw(self.ty, Arc::clone(&self.value));
    }

    /// Split into key and value.
    pub fn into_parts(self) -> (ErasedComponentType, ComponentValue) {
        (self.ty, self.value)
    }
}

impl PartialEq for TypedComponent {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.value.dyn_eq(other.value.as_ref())
    }
}

impl fmt::Display for TypedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}=>{:?}", self.ty, self.value)
    }
}
