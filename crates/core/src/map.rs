//! Read-only component maps.
//!
//! Every map here is immutable after construction and cheap to share behind
//! an `Arc`. Layered views ([`CompositeComponentMap`],
//! [`FilteredComponentMap`]) hold references to the maps they wrap and never
//! copy their data.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::component::{
    Component, ComponentType, ComponentValue, ErasedComponentType, TypedComponent,
};

/// Below this many entries a built map is a plain association list.
pub const SMALL_MAP_THRESHOLD: usize = 8;

/// Shared, read-only component map.
pub type SharedComponentMap = Arc<dyn ComponentMap>;

/// Read access to a set of components.
///
/// Iteration order is implementation-defined but stable for a given
/// instance.
pub trait ComponentMap: fmt::Debug + Send + Sync {
    /// Erased value stored for `ty`.
    fn get_raw(&self, ty: ErasedComponentType) -> Option<&ComponentValue>;

    /// Keys present in the map.
    fn keys(&self) -> Box<dyn Iterator<Item = ErasedComponentType> + '_>;

    /// Components present in the map, built on demand.
    fn iter(&self) -> Box<dyn Iterator<Item = TypedComponent> + '_>;

    /// Number of components.
    fn len(&self) -> usize {
        self.keys().count()
    }

    /// Returns true if the map holds no components.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a value is stored for `ty`.
    fn contains(&self, ty: ErasedComponentType) -> bool {
        self.get_raw(ty).is_some()
    }

    /// Snapshot of the key set.
    fn key_set(&self) -> BTreeSet<ErasedComponentType> {
        self.keys().collect()
    }
}

/// Typed accessors available on every [`ComponentMap`].
pub trait ComponentGetter {
    /// Value stored for `ty`.
    fn get<T: Component>(&self, ty: ComponentType<T>) -> Option<&T>;

    /// Value stored for `ty`, or `default` when absent.
    fn get_or_default<T: Component>(&self, ty: ComponentType<T>, default: T) -> T;

    /// Whether a value is stored for `ty`.
    fn has<T: Component>(&self, ty: ComponentType<T>) -> bool;
}

impl<M: ComponentMap + ?Sized> ComponentGetter for M {
    fn get<T: Component>(&self, ty: ComponentType<T>) -> Option<&T> {
        let erased = ty.erased();
        self.get_raw(erased)
            .map(|value| erased.downcast::<T>(value.as_ref()))
    }

    fn get_or_default<T: Component>(&self, ty: ComponentType<T>, default: T) -> T {
        self.get(ty).cloned().unwrap_or(default)
    }

    fn has<T: Component>(&self, ty: ComponentType<T>) -> bool {
        self.contains(ty.erased())
    }
}

/// The map with no components.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyComponentMap;

impl ComponentMap for EmptyComponentMap {
    fn get_raw(&self, _ty: ErasedComponentType) -> Option<&ComponentValue> {
        None
    }

    fn keys(&self) -> Box<dyn Iterator<Item = ErasedComponentType> + '_> {
        Box::new(std::iter::empty())
    }

    fn iter(&self) -> Box<dyn Iterator<Item = TypedComponent> + '_> {
        Box::new(std::iter::empty())
    }

    fn len(&self) -> usize {
        0
    }
}

static EMPTY_MAP: LazyLock<SharedComponentMap> = LazyLock::new(|| Arc::new(EmptyComponentMap));

/// The canonical shared empty map.
pub fn empty_map() -> SharedComponentMap {
    Arc::clone(&EMPTY_MAP)
}

/// Layer `overrides` over `prototype` without copying either.
pub fn composite(prototype: SharedComponentMap, overrides: SharedComponentMap) -> SharedComponentMap {
    Arc::new(CompositeComponentMap {
        prototype,
        overrides,
    })
}

/// View of `map` restricted to keys accepted by `predicate`.
pub fn filter<F>(map: SharedComponentMap, predicate: F) -> SharedComponentMap
where
    F: Fn(ErasedComponentType) -> bool + Send + Sync + 'static,
{
    Arc::new(FilteredComponentMap {
        inner: map,
        predicate: Arc::new(predicate),
    })
}

#[derive(Debug, Clone)]
enum Storage {
    Small(Vec<(ErasedComponentType, ComponentValue)>),
    Large(BTreeMap<ErasedComponentType, ComponentValue>),
}

/// Flat map produced by [`ComponentMapBuilder`].
#[derive(Debug, Clone)]
pub struct SimpleComponentMap {
    storage: Storage,
}

impl SimpleComponentMap {
    fn from_entries(entries: BTreeMap<ErasedComponentType, ComponentValue>) -> Self {
        let storage = if entries.len() < SMALL_MAP_THRESHOLD {
            Storage::Small(entries.into_iter().collect())
        } else {
            Storage::Large(entries)
        };
        Self { storage }
    }
}

impl ComponentMap for SimpleComponentMap {
    fn get_raw(&self, ty: ErasedComponentType) -> Option<&ComponentValue> {
        match &self.storage {
            Storage::Small(entries) => entries
                .iter()
                .find(|(key, _)| *key == ty)
                .map(|(_, value)| value),
            Storage::Large(entries) => entries.get(&ty),
        }
    }

    fn keys(&self) -> Box<dyn Iterator<Item = ErasedComponentType> + '_> {
        match &self.storage {
            Storage::Small(entries) => Box::new(entries.iter().map(|(key, _)| *key)),
            Storage::Large(entries) => Box::new(entries.keys().copied()),
        }
    }

    fn iter(&self) -> Box<dyn Iterator<Item = TypedComponent> + '_> {
        match &self.storage {
            Storage::Small(entries) => Box::new(
                entries
                    .iter()
                    .map(|(key, value)| TypedComponent::from_raw(*key, Arc::clone(value))),
            ),
            Storage::Large(entries) => Box::new(
                entries
                    .iter()
                    .map(|(key, value)| TypedComponent::from_raw(*key, Arc::clone(value))),
            ),
        }
    }

    fn len(&self) -> usize {
        match &self.storage {
            Storage::Small(entries) => entries.len(),
            Storage::Large(entries) => entries.len(),
        }
    }
}

/// Accumulates components and freezes them into a flat map.
#[derive(Debug, Default)]
pub struct ComponentMapBuilder {
    entries: BTreeMap<ErasedComponentType, ComponentValue>,
}

impl ComponentMapBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `ty` to `value`; `None` removes any earlier value.
    pub fn set<T: Component>(&mut self, ty: ComponentType<T>, value: impl Into<Option<T>>) -> &mut Self {
        match value.into() {
            Some(value) => {
                self.entries.insert(ty.erased(), Arc::new(value));
            }
            None => {
                self.entries.remove(&ty.erased());
            }
        }
        self
    }

    /// Erased form of [`set`](Self::set).
    ///
    /// # Panics
    /// If `value` does not have the key's declared type.
    pub fn set_raw(&mut self, ty: ErasedComponentType, value: Option<ComponentValue>) -> &mut Self {
        match value {
            Some(value) => {
                ty.check_value(value.as_ref());
                self.entries.insert(ty, value);
            }
            None => {
                self.entries.remove(&ty);
            }
        }
        self
    }

    /// Copy every component of `map` into the builder.
    pub fn add_all(&mut self, map: &dyn ComponentMap) -> &mut Self {
        for component in map.iter() {
            let (ty, value) = component.into_parts();
            self.entries.insert(ty, value);
        }
        self
    }

    /// Freeze into a map; an empty builder yields [`empty_map`].
    pub fn build(&mut self) -> SharedComponentMap {
        if self.entries.is_empty() {
            return empty_map();
        }
        Arc::new(SimpleComponentMap::from_entries(std::mem::take(
            &mut self.entries,
        )))
    }
}

/// `overrides` layered over `prototype`.
#[derive(Debug, Clone)]
pub struct CompositeComponentMap {
    prototype: SharedComponentMap,
    overrides: SharedComponentMap,
}

impl ComponentMap for CompositeComponentMap {
    fn get_raw(&self, ty: ErasedComponentType) -> Option<&ComponentValue> {
        self.overrides
            .get_raw(ty)
            .or_else(|| self.prototype.get_raw(ty))
    }

    fn keys(&self) -> Box<dyn Iterator<Item = ErasedComponentType> + '_> {
        Box::new(
            self.overrides.keys().chain(
                self.prototype
                    .keys()
                    .filter(move |key| !self.overrides.contains(*key)),
            ),
        )
    }

    fn iter(&self) -> Box<dyn Iterator<Item = TypedComponent> + '_> {
        Box::new(
            self.overrides.iter().chain(
                self.prototype
                    .iter()
                    .filter(move |component| !self.overrides.contains(component.ty())),
            ),
        )
    }
}

type KeyPredicate = Arc<dyn Fn(ErasedComponentType) -> bool + Send + Sync>;

/// `inner` restricted to the keys a predicate accepts.
#[derive(Clone)]
pub struct FilteredComponentMap {
    inner: SharedComponentMap,
    predicate: KeyPredicate,
}

impl fmt::Debug for FilteredComponentMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredComponentMap")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl ComponentMap for FilteredComponentMap {
    fn get_raw(&self, ty: ErasedComponentType) -> Option<&ComponentValue> {
        if (self.predicate)(ty) {
            self.inner.get_raw(ty)
        } else {
            None
        }
    }

    fn keys(&self) -> Box<dyn Iterator<Item = ErasedComponentType> + '_> {
        Box::new(self.inner.keys().filter(move |key| (self.predicate)(*key)))
    }

    fn iter(&self) -> Box<dyn Iterator<Item = TypedComponent> + '_> {
        Box::new(
            self.inner
                .iter()
                .filter(move |component| (self.predicate)(component.ty())),
        )
    }
}

/// Compare two maps by content.
pub fn maps_equal(a: &dyn ComponentMap, b: &dyn ComponentMap) -> bool {
    a.len() == b.len()
        && a.iter().all(|component| {
            b.get_raw(component.ty())
                .is_some_and(|other| other.dyn_eq(component.raw_value().as_ref()))
        })
}
