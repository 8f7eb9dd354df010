#![forbid(unsafe_code)]

//! Structural change events and the observer contract.
//!
//! Every structural mutation of a [`DataTree`] is announced to registered
//! observers as exactly one [`TreeEvent`]. Delivery is synchronous and
//! single-threaded: the mutating call does not return until every observer
//! handler has run. For `NodePruned` and `NodeRemoved` the event fires
//! *before* the structural change, so handlers can still traverse the doomed
//! node; for `NodeAdded` and `NodeChanged` it fires after.

use crate::tree::{DataTree, NodeId};

/// A structural change in a [`DataTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    /// A node's content was updated in place.
    NodeChanged(NodeId),

    /// A new node was inserted.
    NodeAdded(NodeId),

    /// The node and its entire subtree are about to be deleted.
    NodePruned(NodeId),

    /// The node is about to be deleted; its children will be promoted to its
    /// former parent.
    NodeRemoved(NodeId),
}

impl TreeEvent {
    /// The node the event refers to.
    #[must_use]
    pub fn node(&self) -> NodeId {
        match self {
            Self::NodeChanged(id) | Self::NodeAdded(id) | Self::NodePruned(id)
            | Self::NodeRemoved(id) => *id,
        }
    }
}

/// Receiver of [`TreeEvent`]s.
///
/// Handlers get a shared borrow of the tree in its pre-mutation state (for
/// prune/remove) or post-mutation state (for add/change). Handlers must not
/// mutate the tree re-entrantly; doing so is a `RefCell` borrow panic at the
/// call site.
pub trait TreeObserver {
    /// Handle one structural change event.
    fn on_tree_event(&mut self, tree: &DataTree, event: &TreeEvent);
}

/// Handle identifying one observer registration, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}
