#![forbid(unsafe_code)]

//! Typed property values and the default-value catalog.
//!
//! Properties are the payload of a [`DataNode`](crate::DataNode): named,
//! typed values looked up by string key. [`PropertyDefaults`] holds prototype
//! values that are cloned on demand when a consumer asks for a key the node
//! does not carry yet (lazy materialization).

use std::collections::HashMap;
use std::fmt;

/// A typed property value attached to a node under a string key.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Property {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Free-form text.
    Text(String),
}

impl Property {
    /// Convenience constructor for a text property.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// The boolean payload, if this is a [`Property::Bool`].
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if this is a [`Property::Int`].
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The float payload, if this is a [`Property::Float`].
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The text payload, if this is a [`Property::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value as a display string.
    #[must_use]
    pub fn value_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Property {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Property {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Property {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Property {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Property {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Catalog of per-key prototype values for lazy property creation.
///
/// Consumers that want a property present on every node they touch register
/// a prototype here; [`create`](Self::create) clones it for attachment.
#[derive(Debug, Clone, Default)]
pub struct PropertyDefaults {
    prototypes: HashMap<String, Property>,
}

impl PropertyDefaults {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the prototype value for `key`.
    pub fn register(&mut self, key: impl Into<String>, prototype: Property) {
        self.prototypes.insert(key.into(), prototype);
    }

    /// Remove the prototype for `key`, returning it if present.
    pub fn unregister(&mut self, key: &str) -> Option<Property> {
        self.prototypes.remove(key)
    }

    /// Whether a prototype is registered for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.prototypes.contains_key(key)
    }

    /// Clone the prototype for `key`, if one is registered.
    #[must_use]
    pub fn create(&self, key: &str) -> Option<Property> {
        self.prototypes.get(key).cloned()
    }
}
