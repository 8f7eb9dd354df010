#![forbid(unsafe_code)]

//! Node payloads: property bags with optional per-scope overlays.

use std::collections::HashMap;

use crate::property::Property;

/// Opaque key selecting a per-consumer property overlay bag.
///
/// A scoped lookup consults the overlay bag for that scope first and falls
/// back to the node's base bag. Scopes let several consumers of the same tree
/// carry diverging values for the same key (say, per-view visibility) without
/// touching each other's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScopeId(u32);

impl ScopeId {
    /// Create a scope id from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw value.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// The payload of one tree node: a base property bag plus per-scope overlays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataNode {
    properties: HashMap<String, Property>,
    scoped: HashMap<ScopeId, HashMap<String, Property>>,
}

impl DataNode {
    /// Create an empty node payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a base property (builder style).
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: Property) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Look up a base property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }

    /// Look up a property under an optional scope.
    ///
    /// With a scope, the scope's overlay bag wins over the base bag; without
    /// one this is a plain base lookup.
    #[must_use]
    pub fn property_scoped(&self, key: &str, scope: Option<ScopeId>) -> Option<&Property> {
        if let Some(scope) = scope {
            if let Some(value) = self.scoped.get(&scope).and_then(|bag| bag.get(key)) {
                return Some(value);
            }
        }
        self.properties.get(key)
    }

    /// Set a base property.
    pub fn set_property(&mut self, key: impl Into<String>, value: Property) {
        self.properties.insert(key.into(), value);
    }

    /// Set a property in a scope's overlay bag, or the base bag when `scope`
    /// is `None`.
    pub fn set_property_scoped(
        &mut self,
        key: impl Into<String>,
        value: Property,
        scope: Option<ScopeId>,
    ) {
        match scope {
            Some(scope) => {
                self.scoped.entry(scope).or_default().insert(key.into(), value);
            }
            None => {
                self.properties.insert(key.into(), value);
            }
        }
    }

    /// Remove a base property, returning it if present.
    pub fn remove_property(&mut self, key: &str) -> Option<Property> {
        self.properties.remove(key)
    }

    /// Whether the scope carries its own overlay value for `key`.
    #[must_use]
    pub fn has_scoped_override(&self, key: &str, scope: ScopeId) -> bool {
        self.scoped
            .get(&scope)
            .is_some_and(|bag| bag.contains_key(key))
    }

    /// Iterate over the base property bag.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The boolean payload of a base property, if present and boolean.
    #[must_use]
    pub fn bool_property(&self, key: &str) -> Option<bool> {
        self.properties.get(key).and_then(Property::as_bool)
    }
}
