#![forbid(unsafe_code)]

//! Filter predicates.
//!
//! A predicate is a plain function pointer over a node payload. Function
//! pointers compare by address, which is what makes the
//! [`set_filter`](crate::TreeFilter::set_filter) idempotence check possible;
//! predicates must be pure and deterministic over the node's current state.

use larch_core::DataNode;

/// Decides whether a node belongs in the projection.
pub type FilterFn = fn(&DataNode) -> bool;

/// The default predicate: every node passes.
pub fn accept_all(_node: &DataNode) -> bool {
    true
}

/// Passes nodes whose `"visible"` bool property is `true`.
pub fn is_visible(node: &DataNode) -> bool {
    node.bool_property("visible") == Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use larch_core::Property;

    #[test]
    fn accept_all_accepts() {
        assert!(accept_all(&DataNode::new()));
    }

    #[test]
    fn is_visible_checks_bool_property() {
        assert!(!is_visible(&DataNode::new()));
        assert!(is_visible(
            &DataNode::new().with_property("visible", Property::Bool(true))
        ));
        assert!(!is_visible(
            &DataNode::new().with_property("visible", Property::Bool(false))
        ));
        // A non-bool value under the key does not count as visible.
        assert!(!is_visible(
            &DataNode::new().with_property("visible", Property::text("yes"))
        ));
    }
}
