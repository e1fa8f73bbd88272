#![warn(missing_docs)]
//! Shared fixtures for component tests: a sample item registry, proptest
//! strategies over patches and edits, and a JSONL journal of persisted patches.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use mdcomponents_core::{
    persist, ComponentFlags, ComponentMapBuilder, ComponentPatch, ComponentRegistry,
    ComponentType, ErasedComponentType, PatchedComponentMap, SharedComponentMap, TypedComponent,
};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

/// Item rarity tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rarity {
    /// Default tier.
    Common,
    /// Slightly better.
    Uncommon,
    /// Hard to find.
    Rare,
    /// Unique drops.
    Epic,
}

/// Keys of the sample item registry.
#[derive(Debug, Clone, Copy)]
pub struct ItemComponents {
    /// Largest stack an item forms.
    pub max_stack_size: ComponentType<u32>,
    /// Rarity tier.
    pub rarity: ComponentType<Rarity>,
    /// Tooltip lines.
    pub lore: ComponentType<Vec<String>>,
    /// Player-assigned name.
    pub custom_name: ComponentType<String>,
    /// Durability used up.
    pub damage: ComponentType<u32>,
    /// Client-only creative inventory marker; never persisted.
    pub creative_slot_lock: ComponentType<bool>,
    /// Enchantment shimmer; wire encodings are cached.
    pub enchantment_glint: ComponentType<bool>,
}

impl ItemComponents {
    /// Register every item component into `registry`.
    pub fn register(registry: &mut ComponentRegistry) -> Self {
        let plain = ComponentFlags::empty();
        Self {
            max_stack_size: registry
                .register("max_stack_size", plain)
                .expect("register max_stack_size"),
            damage: registry.register("damage", plain).expect("register damage"),
            rarity: registry.register("rarity", plain).expect("register rarity"),
            lore: registry.register("lore", plain).expect("register lore"),
            custom_name: registry
                .register("custom_name", plain)
                .expect("register custom_name"),
            creative_slot_lock: registry
                .register("creative_slot_lock", ComponentFlags::TRANSIENT)
                .expect("register creative_slot_lock"),
            enchantment_glint: registry
                .register("enchantment_glint", ComponentFlags::CACHE_ENCODING)
                .expect("register enchantment_glint"),
        }
    }

    /// Every key, in a fixed order.
    pub fn all(&self) -> [ErasedComponentType; 7] {
        [
            self.max_stack_size.erased(),
            self.damage.erased(),
            self.rarity.erased(),
            self.lore.erased(),
            self.custom_name.erased(),
            self.creative_slot_lock.erased(),
            self.enchantment_glint.erased(),
        ]
    }
}

/// A fresh registry holding the item components.
pub fn sample_registry() -> (ComponentRegistry, ItemComponents) {
    let mut registry = ComponentRegistry::new();
    let items = ItemComponents::register(&mut registry);
    (registry, items)
}

/// The prototype `{max_stack_size: 64, rarity: Common}`.
pub fn item_prototype(items: &ItemComponents) -> SharedComponentMap {
    ComponentMapBuilder::new()
        .set(items.max_stack_size, 64)
        .set(items.rarity, Rarity::Common)
        .build()
}

/// Strategy over rarities.
pub fn arb_rarity() -> impl Strategy<Value = Rarity> {
    prop_oneof![
        Just(Rarity::Common),
        Just(Rarity::Uncommon),
        Just(Rarity::Rare),
        Just(Rarity::Epic),
    ]
}

/// Strategy over components with values drawn near the prototype's, so
/// generated edits regularly collide with prototype values.
pub fn arb_component(items: ItemComponents) -> impl Strategy<Value = TypedComponent> {
    prop_oneof![
        prop_oneof![Just(64u32), 1u32..=99].prop_map(move |v| TypedComponent::new(items.max_stack_size, v)),
        (0u32..4).prop_map(move |v| TypedComponent::new(items.damage, v)),
        arb_rarity().prop_map(move |v| TypedComponent::new(items.rarity, v)),
        prop::collection::vec("[a-z ]{0,8}", 0..3).prop_map(move |v| TypedComponent::new(items.lore, v)),
        "[A-Za-z]{0,6}".prop_map(move |v| TypedComponent::new(items.custom_name, v)),
        any::<bool>().prop_map(move |v| TypedComponent::new(items.creative_slot_lock, v)),
        any::<bool>().prop_map(move |v| TypedComponent::new(items.enchantment_glint, v)),
    ]
}

/// Strategy over item keys.
pub fn arb_key(items: ItemComponents) -> impl Strategy<Value = ErasedComponentType> {
    prop::sample::select(items.all().to_vec())
}

/// One mutation of a [`PatchedComponentMap`].
#[derive(Debug, Clone)]
pub enum Edit {
    /// Set a component.
    Set(TypedComponent),
    /// Remove a component.
    Remove(ErasedComponentType),
}

impl Edit {
    /// Apply this edit to `map`.
    pub fn apply(&self, map: &mut PatchedComponentMap) {
        match self {
            Edit::Set(component) => component.apply_to(map),
            Edit::Remove(ty) => {
                map.remove_raw(*ty);
            }
        }
    }
}

/// Strategy over single edits.
pub fn arb_edit(items: ItemComponents) -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => arb_component(items).prop_map(Edit::Set),
        1 => arb_key(items).prop_map(Edit::Remove),
    ]
}

/// Strategy over edit sequences.
pub fn arb_edits(items: ItemComponents, max_len: usize) -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(arb_edit(items), 0..=max_len)
}

/// Strategy over arbitrary patches, including entries that would be no-ops
/// against [`item_prototype`].
pub fn arb_patch(items: ItemComponents) -> impl Strategy<Value = ComponentPatch> {
    arb_edits(items, 8).prop_map(|edits| {
        let mut builder = ComponentPatch::builder();
        for edit in edits {
            match edit {
                Edit::Set(component) => builder.set_typed(component),
                Edit::Remove(ty) => builder.remove_raw(ty),
            };
        }
        builder.build()
    })
}

/// Strategy over patches reachable by editing [`item_prototype`], and thus
/// free of no-op entries.
pub fn arb_sanitized_patch(items: ItemComponents) -> impl Strategy<Value = ComponentPatch> {
    arb_edits(items, 8).prop_map(move |edits| {
        let mut map = PatchedComponentMap::new(item_prototype(&items));
        for edit in &edits {
            edit.apply(&mut map);
        }
        map.as_patch()
    })
}

/// A sink that appends persisted patches to disk as newline-delimited JSON.
pub struct PatchJournal<'r> {
    registry: &'r ComponentRegistry,
    file: File,
}

impl<'r> PatchJournal<'r> {
    /// Create a new journal at `path`.
    pub fn create<P: AsRef<Path>>(registry: &'r ComponentRegistry, path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self { registry, file })
    }

    /// Append a patch to the journal.
    pub fn write(&mut self, patch: &ComponentPatch) -> io::Result<()> {
        let document = persist::encode_patch(self.registry, patch)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let line = serde_json::to_string(&document)?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        Ok(())
    }
}

/// Read back every patch written by a [`PatchJournal`].
pub fn read_journal<P: AsRef<Path>>(
    registry: &ComponentRegistry,
    path: P,
) -> io::Result<Vec<ComponentPatch>> {
    std::fs::read_to_string(path)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            persist::patch_from_slice(registry, line.as_bytes())
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdcomponents_core::ComponentGetter;

    #[test]
    fn prototype_has_two_components() {
        let (_, items) = sample_registry();
        let prototype = item_prototype(&items);
        assert_eq!(prototype.get(items.max_stack_size), Some(&64));
        assert_eq!(prototype.get(items.rarity), Some(&Rarity::Common));
        assert_eq!(prototype.len(), 2);
    }

    #[test]
    fn journal_roundtrips_persistent_entries() {
        let (registry, items) = sample_registry();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patches.jsonl");

        let first = ComponentPatch::builder()
            .set(items.rarity, Rarity::Epic)
            .remove(items.max_stack_size)
            .build();
        let second = ComponentPatch::builder()
            .set(items.custom_name, "Excalibur".to_string())
            .build();

        let mut journal = PatchJournal::create(&registry, &path).unwrap();
        journal.write(&first).unwrap();
        journal.write(&second).unwrap();
        journal.write(&ComponentPatch::empty()).unwrap();

        let read = read_journal(&registry, &path).unwrap();
        assert_eq!(read, vec![first, second, ComponentPatch::empty()]);
    }
}
