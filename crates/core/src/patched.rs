//! Mutable component maps: a shared prototype plus a private patch.
//!
//! The patch storage is copy-on-write. [`PatchedComponentMap::copy`] and
//! [`PatchedComponentMap::as_patch`] hand out aliases of the storage and flag
//! it as shared; the next mutator forks it before writing.
//!
//! The patch is kept sanitized: it never records a value equal to the
//! prototype's, and never records a removal of a key the prototype lacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::component::{Component, ComponentType, ComponentValue, ErasedComponentType, TypedComponent};
use crate::map::{maps_equal, ComponentMap, SharedComponentMap};
use crate::patch::{empty_entries, ComponentPatch, PatchEntries};

/// Prototype overlaid with a mutable, copy-on-write patch.
#[derive(Debug)]
pub struct PatchedComponentMap {
    prototype: SharedComponentMap,
    patch: Arc<PatchEntries>,
    copy_on_write: AtomicBool,
}

impl PatchedComponentMap {
    /// A map with exactly the prototype's components.
    pub fn new(prototype: SharedComponentMap) -> Self {
        Self {
            prototype,
            patch: empty_entries(),
            copy_on_write: AtomicBool::new(true),
        }
    }

    /// Reconstruct a map from a prototype and a patch recorded against it.
    ///
    /// A sanitized patch is shared as-is; anything else is replayed through
    /// [`apply_patch`](Self::apply_patch).
    pub fn from_patch(prototype: SharedComponentMap, patch: &ComponentPatch) -> Self {
        if is_patch_sanitized(prototype.as_ref(), patch.entries()) {
            return Self {
                prototype,
                patch: Arc::clone(patch.entries()),
                copy_on_write: AtomicBool::new(true),
            };
        }
        let mut map = Self::new(prototype);
        map.apply_patch(patch);
        map
    }

    /// The prototype this map is layered over.
    pub fn prototype(&self) -> &SharedComponentMap {
        &self.prototype
    }

    fn patch_mut(&mut self) -> &mut PatchEntries {
        if *self.copy_on_write.get_mut() {
            trace!(entries = self.patch.len(), "forking shared component patch");
            self.patch = Arc::new(PatchEntries::clone(&self.patch));
            *self.copy_on_write.get_mut() = false;
        }
        Arc::make_mut(&mut self.patch)
    }

    /// Set `ty` to `value`, returning the previous effective value.
    pub fn set<T: Component>(&mut self, ty: ComponentType<T>, value: T) -> Option<T> {
        let erased = ty.erased();
        self.set_raw(erased, Arc::new(value))
            .map(|previous| erased.downcast::<T>(previous.as_ref()).clone())
    }

    /// Erased form of [`set`](Self::set).
    ///
    /// # Panics
    /// If `value` does not have the key's declared type.
    pub fn set_raw(&mut self, ty: ErasedComponentType, value: ComponentValue) -> Option<ComponentValue> {
        ty.check_value(value.as_ref());
        let default = self.prototype.get_raw(ty).cloned();
        let patch = self.patch_mut();
        let previous = if default
            .as_ref()
            .is_some_and(|default| default.dyn_eq(value.as_ref()))
        {
            patch.remove(&ty)
        } else {
            patch.insert(ty, Some(value))
        };
        match previous {
            Some(entry) => entry,
            None => default,
        }
    }

    /// Remove `ty`, returning the previous effective value.
    pub fn remove<T: Component>(&mut self, ty: ComponentType<T>) -> Option<T> {
        let erased = ty.erased();
        self.remove_raw(erased)
            .map(|previous| erased.downcast::<T>(previous.as_ref()).clone())
    }

    /// Erased form of [`remove`](Self::remove).
    pub fn remove_raw(&mut self, ty: ErasedComponentType) -> Option<ComponentValue> {
        let default = self.prototype.get_raw(ty).cloned();
        let patch = self.patch_mut();
        let previous = if default.is_some() {
            patch.insert(ty, None)
        } else {
            patch.remove(&ty)
        };
        match previous {
            Some(entry) => entry,
            None => default,
        }
    }

    /// Apply every entry of `patch`, skipping entries that would be no-ops.
    pub fn apply_patch(&mut self, patch: &ComponentPatch) {
        if patch.is_empty() {
            return;
        }
        self.patch_mut();
        for (ty, entry) in patch.iter() {
            match entry {
                Some(value) => {
                    self.set_raw(ty, Arc::clone(value));
                }
                None => {
                    self.remove_raw(ty);
                }
            }
        }
    }

    /// Replace the whole patch with `patch`, verbatim.
    ///
    /// Intended for snapshots taken with [`as_patch`](Self::as_patch) against
    /// the same prototype; no sanitization is performed.
    pub fn restore_patch(&mut self, patch: &ComponentPatch) {
        self.patch = Arc::clone(patch.entries());
        *self.copy_on_write.get_mut() = true;
    }

    /// Drop every override, reverting to the prototype.
    pub fn clear_patch(&mut self) {
        self.patch_mut().clear();
    }

    /// [`set`](Self::set) every component of `map`.
    pub fn set_all(&mut self, map: &dyn ComponentMap) {
        for component in map.iter() {
            component.apply_to(self);
        }
    }

    /// Returns true if the map currently equals its prototype.
    pub fn is_patch_empty(&self) -> bool {
        self.patch.is_empty()
    }

    /// Snapshot of the current overrides.
    ///
    /// The returned patch aliases this map's storage; the next mutation here
    /// forks it first.
    pub fn as_patch(&self) -> ComponentPatch {
        if self.patch.is_empty() {
            return ComponentPatch::empty();
        }
        self.copy_on_write.store(true, Ordering::Relaxed);
        ComponentPatch::from_entries(Arc::clone(&self.patch))
    }

    /// O(1) logical copy sharing the patch storage until either side writes.
    pub fn copy(&self) -> Self {
        self.copy_on_write.store(true, Ordering::Relaxed);
        Self {
            prototype: Arc::clone(&self.prototype),
            patch: Arc::clone(&self.patch),
            copy_on_write: AtomicBool::new(true),
        }
    }

    /// Read-only view of the current state.
    ///
    /// Returns the prototype itself when nothing is overridden.
    pub fn to_immutable_map(&self) -> SharedComponentMap {
        if self.patch.is_empty() {
            return Arc::clone(&self.prototype);
        }
        Arc::new(self.copy())
    }
}

impl Clone for PatchedComponentMap {
    fn clone(&self) -> Self {
        self.copy()
    }
}

impl PartialEq for PatchedComponentMap {
    /// Equal when the prototypes hold the same components and the patches
    /// are equal.
    fn eq(&self, other: &Self) -> bool {
        let same_prototype =
            std::ptr::addr_eq(Arc::as_ptr(&self.prototype), Arc::as_ptr(&other.prototype))
                || maps_equal(self.prototype.as_ref(), other.prototype.as_ref());
        same_prototype && self.patch_snapshot() == other.patch_snapshot()
    }
}

impl PatchedComponentMap {
    fn patch_snapshot(&self) -> ComponentPatch {
        ComponentPatch::from_entries(Arc::clone(&self.patch))
    }
}

impl ComponentMap for PatchedComponentMap {
    fn get_raw(&self, ty: ErasedComponentType) -> Option<&ComponentValue> {
        match self.patch.get(&ty) {
            Some(entry) => entry.as_ref(),
            None => self.prototype.get_raw(ty),
        }
    }

    fn keys(&self) -> Box<dyn Iterator<Item = ErasedComponentType> + '_> {
        Box::new(
            self.prototype
                .keys()
                .filter(move |ty| !self.patch.contains_key(ty))
                .chain(
                    self.patch
                        .iter()
                        .filter(|(_, entry)| entry.is_some())
                        .map(|(ty, _)| *ty),
                ),
        )
    }

    fn iter(&self) -> Box<dyn Iterator<Item = TypedComponent> + '_> {
        Box::new(
            self.prototype
                .iter()
                .filter(move |component| !self.patch.contains_key(&component.ty()))
                .chain(self.patch.iter().filter_map(|(ty, entry)| {
                    entry
                        .as_ref()
                        .map(|value| TypedComponent::from_raw(*ty, Arc::clone(value)))
                })),
        )
    }

    fn len(&self) -> usize {
        let mut len = self.prototype.len();
        for (ty, entry) in self.patch.iter() {
            match (self.prototype.contains(*ty), entry.is_some()) {
                (true, false) => len -= 1,
                (false, true) => len += 1,
                _ => {}
            }
        }
        len
    }
}

fn is_patch_sanitized(prototype: &dyn ComponentMap, patch: &PatchEntries) -> bool {
    patch.iter().all(|(ty, entry)| {
        let default = prototype.get_raw(*ty);
        match (entry, default) {
            (Some(value), Some(default)) => !value.dyn_eq(default.as_ref()),
            (None, None) => false,
            _ => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentFlags;
    use crate::map::{ComponentGetter, ComponentMapBuilder};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Rarity {
        Common,
        Rare,
    }

    struct Fixture {
        size: ComponentType<u32>,
        rarity: ComponentType<Rarity>,
        lore: ComponentType<Vec<String>>,
        prototype: SharedComponentMap,
    }

    fn fixture() -> Fixture {
        let size = ComponentType::new(ComponentFlags::empty());
        let rarity = ComponentType::new(ComponentFlags::empty());
        let lore = ComponentType::new(ComponentFlags::empty());
        let prototype = ComponentMapBuilder::new()
            .set(size, 64)
            .set(rarity, Rarity::Common)
            .build();
        Fixture {
            size,
            rarity,
            lore,
            prototype,
        }
    }

    fn lore(line: &str) -> Vec<String> {
        vec![line.to_string()]
    }

    #[test]
    fn reads_fall_through_to_prototype() {
        let f = fixture();
        let map = PatchedComponentMap::new(f.prototype.clone());
        assert_eq!(map.get(f.size), Some(&64));
        assert_eq!(map.get(f.rarity), Some(&Rarity::Common));
        assert_eq!(map.len(), 2);
        assert!(map.is_patch_empty());
    }

    #[test]
    fn set_to_prototype_value_clears_entry() {
        let f = fixture();
        let mut map = PatchedComponentMap::new(f.prototype.clone());

        assert_eq!(map.set(f.rarity, Rarity::Rare), Some(Rarity::Common));
        assert_eq!(map.get(f.rarity), Some(&Rarity::Rare));
        let patch = map.as_patch();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get(f.rarity), Some(Some(&Rarity::Rare)));

        assert_eq!(map.set(f.rarity, Rarity::Common), Some(Rarity::Rare));
        assert!(map.as_patch().is_empty());
        // The snapshot taken earlier is unaffected by later writes.
        assert_eq!(patch.get(f.rarity), Some(Some(&Rarity::Rare)));
    }

    #[test]
    fn removing_absent_key_records_nothing() {
        let f = fixture();
        let mut map = PatchedComponentMap::new(f.prototype.clone());
        assert_eq!(map.remove(f.lore), None);
        assert!(map.as_patch().is_empty());
    }

    #[test]
    fn removing_prototype_key_records_removal() {
        let f = fixture();
        let mut map = PatchedComponentMap::new(f.prototype.clone());
        assert_eq!(map.remove(f.size), Some(64));
        assert_eq!(map.get(f.size), None);
        assert_eq!(map.len(), 1);
        assert_eq!(map.as_patch().get(f.size), Some(None));

        // Removing again reports the current effective value.
        assert_eq!(map.remove(f.size), None);
    }

    #[test]
    fn removing_added_key_drops_entry() {
        let f = fixture();
        let mut map = PatchedComponentMap::new(f.prototype.clone());
        map.set(f.lore, lore("a"));
        assert_eq!(map.remove(f.lore), Some(lore("a")));
        assert!(map.is_patch_empty());
    }

    #[test]
    fn set_after_removal_reports_absent_previous() {
        let f = fixture();
        let mut map = PatchedComponentMap::new(f.prototype.clone());
        map.remove(f.size);
        assert_eq!(map.set(f.size, 32), None);
        assert_eq!(map.get(f.size), Some(&32));
    }

    #[test]
    fn copies_are_independent() {
        let f = fixture();
        let mut original = PatchedComponentMap::new(f.prototype.clone());
        original.set(f.lore, lore("a"));

        let mut copy = original.copy();
        copy.set(f.lore, lore("b"));
        assert_eq!(original.get(f.lore), Some(&lore("a")));
        assert_eq!(copy.get(f.lore), Some(&lore("b")));

        original.set(f.size, 1);
        assert_eq!(copy.get(f.size), Some(&64));
    }

    #[test]
    fn clone_is_copy() {
        let f = fixture();
        let mut original = PatchedComponentMap::new(f.prototype.clone());
        original.set(f.size, 8);
        let mut cloned = original.clone();
        cloned.clear_patch();
        assert_eq!(original.get(f.size), Some(&8));
        assert_eq!(cloned.get(f.size), Some(&64));
    }

    #[test]
    fn from_patch_shares_sanitized_patch() {
        let f = fixture();
        let patch = ComponentPatch::builder()
            .set(f.rarity, Rarity::Rare)
            .remove(f.size)
            .build();
        let map = PatchedComponentMap::from_patch(f.prototype.clone(), &patch);
        assert!(Arc::ptr_eq(&map.patch, patch.entries()));
        assert_eq!(map.as_patch(), patch);
    }

    #[test]
    fn from_patch_sanitizes_no_ops() {
        let f = fixture();
        let patch = ComponentPatch::builder()
            .set(f.size, 64)
            .remove(f.lore)
            .set(f.rarity, Rarity::Rare)
            .build();
        let map = PatchedComponentMap::from_patch(f.prototype.clone(), &patch);

        let sanitized = map.as_patch();
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized.get(f.rarity), Some(Some(&Rarity::Rare)));

        let again = PatchedComponentMap::from_patch(f.prototype.clone(), &sanitized);
        assert_eq!(again.as_patch(), sanitized);
    }

    #[test]
    fn restore_patch_is_verbatim() {
        let f = fixture();
        let mut map = PatchedComponentMap::new(f.prototype.clone());
        let raw = ComponentPatch::builder().set(f.size, 64).build();
        map.restore_patch(&raw);
        assert_eq!(map.as_patch(), raw);
        assert_eq!(map.get(f.size), Some(&64));

        map.set(f.size, 10);
        assert_eq!(raw.get(f.size), Some(Some(&64)));
    }

    #[test]
    fn set_all_applies_each_component() {
        let f = fixture();
        let mut map = PatchedComponentMap::new(f.prototype.clone());
        let incoming = ComponentMapBuilder::new()
            .set(f.size, 64)
            .set(f.lore, lore("x"))
            .build();
        map.set_all(incoming.as_ref());
        let patch = map.as_patch();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get(f.lore), Some(Some(&lore("x"))));
    }

    #[test]
    fn keys_and_iteration_overlay_patch() {
        let f = fixture();
        let mut map = PatchedComponentMap::new(f.prototype.clone());
        map.remove(f.size);
        map.set(f.lore, lore("a"));
        map.set(f.rarity, Rarity::Rare);

        let keys = map.key_set();
        assert!(!keys.contains(&f.size.erased()));
        assert!(keys.contains(&f.lore.erased()));
        assert!(keys.contains(&f.rarity.erased()));
        assert_eq!(map.len(), 2);
        assert_eq!(map.iter().count(), 2);
        assert_eq!(map.keys().count(), 2);
    }

    #[test]
    fn immutable_map_avoids_wrapping_when_clean() {
        let f = fixture();
        let mut map = PatchedComponentMap::new(f.prototype.clone());
        assert!(Arc::ptr_eq(&map.to_immutable_map(), &f.prototype));

        map.set(f.size, 2);
        let frozen = map.to_immutable_map();
        map.set(f.size, 3);
        assert_eq!(frozen.get(f.size), Some(&2));
        assert_eq!(map.get(f.size), Some(&3));
    }

    #[test]
    fn equality_compares_prototype_contents() {
        let f = fixture();
        let mut a = PatchedComponentMap::new(f.prototype.clone());
        let mut b = PatchedComponentMap::new(f.prototype.clone());
        a.set(f.size, 1);
        b.set(f.size, 1);
        assert_eq!(a, b);

        let rebuilt = ComponentMapBuilder::new()
            .set(f.rarity, Rarity::Common)
            .set(f.size, 64)
            .build();
        let mut c = PatchedComponentMap::new(rebuilt);
        c.set(f.size, 1);
        assert_eq!(a, c);
        c.set(f.rarity, Rarity::Rare);
        assert_ne!(a, c);

        let other = PatchedComponentMap::new(ComponentMapBuilder::new().set(f.size, 64).build());
        assert_ne!(PatchedComponentMap::new(f.prototype.clone()), other);
    }
}
