//! Sparse component diffs.
//!
//! A [`ComponentPatch`] maps each mentioned key to either a replacement value
//! or a removal marker. Patches are immutable and share their entry table
//! behind an `Arc`, so cloning one is O(1).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use crate::component::{Component, ComponentType, ComponentValue, ErasedComponentType, TypedComponent};
use crate::map::{empty_map, ComponentMapBuilder, SharedComponentMap};

/// Entry table shared between patches and patched maps.
///
/// `Some(value)` sets the component, `None` removes it.
pub(crate) type PatchEntries = BTreeMap<ErasedComponentType, Option<ComponentValue>>;

static EMPTY_ENTRIES: LazyLock<Arc<PatchEntries>> = LazyLock::new(|| Arc::new(PatchEntries::new()));

pub(crate) fn empty_entries() -> Arc<PatchEntries> {
    Arc::clone(&EMPTY_ENTRIES)
}

/// Immutable diff against an implicit prototype.
#[derive(Clone)]
pub struct ComponentPatch {
    entries: Arc<PatchEntries>,
}

/// A patch split into its set and removed halves.
#[derive(Debug, Clone)]
pub struct SplitResult {
    /// Every component the patch sets.
    pub added: SharedComponentMap,
    /// Every component the patch removes.
    pub removed: BTreeSet<ErasedComponentType>,
}

impl SplitResult {
    fn empty() -> Self {
        Self {
            added: empty_map(),
            removed: BTreeSet::new(),
        }
    }
}

impl ComponentPatch {
    /// The canonical empty patch.
    pub fn empty() -> Self {
        Self {
            entries: empty_entries(),
        }
    }

    /// Start recording a new patch.
    pub fn builder() -> ComponentPatchBuilder {
        ComponentPatchBuilder::default()
    }

    pub(crate) fn from_entries(entries: Arc<PatchEntries>) -> Self {
        if entries.is_empty() {
            return Self::empty();
        }
        Self { entries }
    }

    pub(crate) fn entries(&self) -> &Arc<PatchEntries> {
        &self.entries
    }

    /// What the patch says about `ty`.
    ///
    /// `None` when the key is not mentioned, `Some(None)` when it is removed
    /// and `Some(Some(value))` when it is set.
    pub fn get<T: Component>(&self, ty: ComponentType<T>) -> Option<Option<&T>> {
        let erased = ty.erased();
        self.get_raw(erased)
            .map(|entry| entry.map(|value| erased.downcast::<T>(value.as_ref())))
    }

    /// Erased form of [`get`](Self::get).
    pub fn get_raw(&self, ty: ErasedComponentType) -> Option<Option<&ComponentValue>> {
        self.entries.get(&ty).map(Option::as_ref)
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (ErasedComponentType, Option<&ComponentValue>)> + '_ {
        self.entries.iter().map(|(ty, entry)| (*ty, entry.as_ref()))
    }

    /// Number of mentioned keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the patch mentions nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry whose key matches `predicate`.
    pub fn forget(&self, predicate: impl Fn(ErasedComponentType) -> bool) -> Self {
        if self.is_empty() {
            return Self::empty();
        }
        let kept: PatchEntries = self
            .entries
            .iter()
            .filter(|(ty, _)| !predicate(**ty))
            .map(|(ty, entry)| (*ty, entry.clone()))
            .collect();
        if kept.len() == self.entries.len() {
            return self.clone();
        }
        Self::from_entries(Arc::new(kept))
    }

    /// Partition into a map of set values and the set of removed keys.
    pub fn split(&self) -> SplitResult {
        if self.is_empty() {
            return SplitResult::empty();
        }

        let mut added = ComponentMapBuilder::new();
        let mut removed = BTreeSet::new();
        for (ty, entry) in self.entries.iter() {
            match entry {
                Some(value) => {
                    added.set_raw(*ty, Some(Arc::clone(value)));
                }
                None => {
                    removed.insert(*ty);
                }
            }
        }
        SplitResult {
            added: added.build(),
            removed,
        }
    }
}

impl Default for ComponentPatch {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for ComponentPatch {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.entries, &other.entries) {
            return true;
        }
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((a_ty, a), (b_ty, b))| {
                    a_ty == b_ty
                        && match (a, b) {
                            (Some(a), Some(b)) => a.dyn_eq(b.as_ref()),
                            (None, None) => true,
                            _ => false,
                        }
                })
    }
}

impl Eq for ComponentPatch {}

impl Hash for ComponentPatch {
    /// Hashes which keys are set and which are removed. Values are left out,
    /// so equal patches always hash alike.
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.entries.len());
        for (ty, entry) in self.entries.iter() {
            ty.hash(state);
            entry.is_some().hash(state);
        }
    }
}

impl fmt::Debug for ComponentPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentPatch{self}")
    }
}

impl fmt::Display for ComponentPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (ty, entry)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match entry {
                Some(value) => write!(f, "{ty:?}=>{value:?}")?,
                None => write!(f, "!{ty:?}")?,
            }
        }
        f.write_str("}")
    }
}

/// Raw diff accumulator. The last write for a key wins.
#[derive(Debug, Default)]
pub struct ComponentPatchBuilder {
    entries: PatchEntries,
}

impl ComponentPatchBuilder {
    /// Record that `ty` is set to `value`.
    pub fn set<T: Component>(&mut self, ty: ComponentType<T>, value: T) -> &mut Self {
        self.entries.insert(ty.erased(), Some(Arc::new(value)));
        self
    }

    /// Record a typed component.
    pub fn set_typed(&mut self, component: TypedComponent) -> &mut Self {
        let (ty, value) = component.into_parts();
        self.entries.insert(ty, Some(value));
        self
    }

    /// Record an erased value for `ty`.
    ///
    /// # Panics
    /// If `value` does not have the key's declared type.
    pub fn set_raw(&mut self, ty: ErasedComponentType, value: ComponentValue) -> &mut Self {
        ty.check_value(value.as_ref());
        self.entries.insert(ty, Some(value));
        self
    }

    /// Record that `ty` is removed.
    pub fn remove<T: Component>(&mut self, ty: ComponentType<T>) -> &mut Self {
        self.remove_raw(ty.erased())
    }

    /// Erased form of [`remove`](Self::remove).
    pub fn remove_raw(&mut self, ty: ErasedComponentType) -> &mut Self {
        self.entries.insert(ty, None);
        self
    }

    /// Number of keys recorded so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the recorded entries; yields [`ComponentPatch::empty`] when
    /// nothing was recorded.
    pub fn build(&mut self) -> ComponentPatch {
        ComponentPatch::from_entries(Arc::new(std::mem::take(&mut self.entries)))
    }
}
