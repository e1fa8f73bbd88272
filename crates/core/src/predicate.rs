//! Exact-match predicates over component maps.
//!
//! Used by recipes and loot conditions that require an item to carry
//! specific component values.

use std::fmt;
use std::sync::Arc;

use crate::component::{Component, ComponentType, TypedComponent};
use crate::map::ComponentMap;
use crate::patch::ComponentPatch;

/// Matches maps that hold every expected component with an equal value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentPredicate {
    expected: Vec<TypedComponent>,
}

impl ComponentPredicate {
    /// Start building a predicate.
    pub fn builder() -> ComponentPredicateBuilder {
        ComponentPredicateBuilder::default()
    }

    /// A predicate that matches any map.
    pub fn any() -> Self {
        Self::default()
    }

    /// A predicate expecting every component of `map`.
    pub fn all_of(map: &dyn ComponentMap) -> Self {
        let mut builder = Self::builder();
        for component in map.iter() {
            builder.expect_typed(component);
        }
        builder.build()
    }

    /// Whether `map` carries every expected component.
    pub fn test(&self, map: &dyn ComponentMap) -> bool {
        self.expected.iter().all(|component| {
            map.get_raw(component.ty())
                .is_some_and(|actual| actual.dyn_eq(component.raw_value().as_ref()))
        })
    }

    /// The expectations as a patch of set values.
    pub fn as_patch(&self) -> ComponentPatch {
        let mut builder = ComponentPatch::builder();
        for component in &self.expected {
            builder.set_raw(component.ty(), Arc::clone(component.raw_value()));
        }
        builder.build()
    }

    /// Returns true if the predicate expects nothing.
    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }

    /// Expected components, in insertion order.
    pub fn expected(&self) -> &[TypedComponent] {
        &self.expected
    }
}

impl fmt::Display for ComponentPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, component) in self.expected.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{component}")?;
        }
        f.write_str("]")
    }
}

/// Collects expectations for a [`ComponentPredicate`].
#[derive(Debug, Default)]
pub struct ComponentPredicateBuilder {
    expected: Vec<TypedComponent>,
}

impl ComponentPredicateBuilder {
    /// Expect `ty` to hold `value`.
    ///
    /// # Panics
    /// If `ty` is already expected by this builder.
    pub fn expect<T: Component>(&mut self, ty: ComponentType<T>, value: T) -> &mut Self {
        self.expect_typed(TypedComponent::new(ty, value))
    }

    /// Expect a typed component.
    ///
    /// # Panics
    /// If the component's key is already expected by this builder.
    pub fn expect_typed(&mut self, component: TypedComponent) -> &mut Self {
        assert!(
            self.expected.iter().all(|existing| existing.ty() != component.ty()),
            "predicate already expects {:?}",
            component.ty()
        );
        self.expected.push(component);
        self
    }

    /// Finish the predicate.
    pub fn build(&mut self) -> ComponentPredicate {
        ComponentPredicate {
            expected: std::mem::take(&mut self.expected),
        }
    }
}
