#![forbid(unsafe_code)]

//! Read/edit-guarded access to one property of one node.
//!
//! A [`PropertyAccessor`] is handed out by
//! [`TreeFilter::property`](crate::TreeFilter::property) and snapshots the
//! visibility/editability decision at creation time. Reads are always
//! permitted; writes require the key to have been in the engine's editable
//! set.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use larch_core::{DataTree, NodeId, Property, ScopeId};

/// Mutable access to a property that was not marked editable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionError {
    key: String,
}

impl PermissionError {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The property key the write was attempted on.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for PermissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "property {:?} is not editable", self.key)
    }
}

impl std::error::Error for PermissionError {}

/// Placeholder shown for an absent or hidden property value.
pub const NO_VALUE: &str = "[no value]";

/// A guarded view over one property of one node.
///
/// Values are resolved lazily against the live tree on every read, so an
/// accessor stays current across edits. An accessor for a key outside the
/// engine's visible set is "null": it reads as absent and refuses writes,
/// regardless of what the node actually carries.
pub struct PropertyAccessor {
    tree: Rc<RefCell<DataTree>>,
    node: NodeId,
    key: String,
    scope: Option<ScopeId>,
    visible: bool,
    editable: bool,
}

impl fmt::Debug for PropertyAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAccessor")
            .field("node", &self.node)
            .field("key", &self.key)
            .field("visible", &self.visible)
            .field("editable", &self.editable)
            .finish()
    }
}

impl PropertyAccessor {
    pub(crate) fn new(
        tree: Rc<RefCell<DataTree>>,
        node: NodeId,
        key: impl Into<String>,
        scope: Option<ScopeId>,
        visible: bool,
        editable: bool,
    ) -> Self {
        Self {
            tree,
            node,
            key: key.into(),
            scope,
            visible,
            editable,
        }
    }

    /// The property key this accessor refers to.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether writes are permitted.
    #[must_use]
    pub fn is_editable(&self) -> bool {
        self.editable
    }

    /// Read the current value. `None` when the property is absent or the key
    /// is not visible.
    #[must_use]
    pub fn value(&self) -> Option<Property> {
        if !self.visible {
            return None;
        }
        let tree = self.tree.borrow();
        tree.node(self.node)
            .and_then(|n| n.property_scoped(&self.key, self.scope))
            .cloned()
    }

    /// Render the current value for display, or [`NO_VALUE`] when absent.
    #[must_use]
    pub fn display_string(&self) -> String {
        match self.value() {
            Some(value) => value.value_string(),
            None => NO_VALUE.to_owned(),
        }
    }

    /// Write a new value.
    ///
    /// The write targets the bag the value resolves from: the engine's scope
    /// overlay when that scope carries the key, the base bag otherwise. A
    /// write to an editable-but-absent property attaches it.
    pub fn set(&self, value: Property) -> Result<(), PermissionError> {
        if !self.editable {
            return Err(PermissionError::new(self.key.clone()));
        }
        let mut tree = self.tree.borrow_mut();
        let Some(node) = tree.node_mut(self.node) else {
            // The node went away after the accessor was created; the write
            // has nothing to land on.
            return Ok(());
        };
        let target = self
            .scope
            .filter(|&scope| node.has_scoped_override(&self.key, scope));
        node.set_property_scoped(self.key.clone(), value, target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larch_core::DataNode;

    fn single_node_tree() -> (Rc<RefCell<DataTree>>, NodeId) {
        let mut tree = DataTree::new();
        let root = tree
            .set_root(DataNode::new().with_property("name", Property::text("lung")))
            .unwrap();
        (Rc::new(RefCell::new(tree)), root)
    }

    #[test]
    fn read_always_permitted() {
        let (tree, root) = single_node_tree();
        let accessor = PropertyAccessor::new(tree, root, "name", None, true, false);
        assert_eq!(accessor.value(), Some(Property::text("lung")));
        assert_eq!(accessor.display_string(), "lung");
        assert!(!accessor.is_editable());
    }

    #[test]
    fn hidden_key_reads_as_absent() {
        let (tree, root) = single_node_tree();
        let accessor = PropertyAccessor::new(tree, root, "name", None, false, false);
        assert_eq!(accessor.value(), None);
        assert_eq!(accessor.display_string(), NO_VALUE);
    }

    #[test]
    fn write_requires_editable() {
        let (tree, root) = single_node_tree();
        let readonly = PropertyAccessor::new(Rc::clone(&tree), root, "name", None, true, false);
        let err = readonly.set(Property::text("heart")).unwrap_err();
        assert_eq!(err.key(), "name");

        let editable = PropertyAccessor::new(Rc::clone(&tree), root, "name", None, true, true);
        editable.set(Property::text("heart")).unwrap();
        assert_eq!(editable.value(), Some(Property::text("heart")));
    }

    #[test]
    fn write_lands_in_resolving_scope() {
        let (tree, root) = single_node_tree();
        let scope = ScopeId::new(4);
        tree.borrow_mut()
            .node_mut(root)
            .unwrap()
            .set_property_scoped("name", Property::text("override"), Some(scope));

        let accessor =
            PropertyAccessor::new(Rc::clone(&tree), root, "name", Some(scope), true, true);
        assert_eq!(accessor.value(), Some(Property::text("override")));

        accessor.set(Property::text("edited")).unwrap();
        // The overlay was updated; the base value is untouched.
        let guard = tree.borrow();
        let node = guard.node(root).unwrap();
        assert_eq!(
            node.property_scoped("name", Some(scope)),
            Some(&Property::text("edited"))
        );
        assert_eq!(node.property("name"), Some(&Property::text("lung")));
    }

    #[test]
    fn write_attaches_absent_property() {
        let (tree, root) = single_node_tree();
        let accessor = PropertyAccessor::new(Rc::clone(&tree), root, "opacity", None, true, true);
        assert_eq!(accessor.value(), None);
        accessor.set(Property::Float(0.5)).unwrap();
        assert_eq!(accessor.value(), Some(Property::Float(0.5)));
    }
}
