#![forbid(unsafe_code)]

//! The data tree: a generational slot arena with a single optional root,
//! ordered children, and synchronous structural-change notification.
//!
//! # Design Invariants
//!
//! 1. **Handle safety**: a [`NodeId`] for a deleted node never resolves to a
//!    later occupant of the same slot; generations are bumped on free.
//! 2. **Single root**: the tree holds zero or one root node. Promoting away a
//!    root with more than one child is refused ([`TreeError::RootSplit`]).
//! 3. **Notification ordering**: `NodeAdded`/`NodeChanged` fire after the
//!    change, `NodePruned`/`NodeRemoved` fire before it, while the affected
//!    nodes are still reachable.
//! 4. **Synchronous delivery**: observers run to completion on the calling
//!    thread inside the mutating call. Re-entrant mutation from a handler is
//!    a `RefCell` borrow panic at the caller's cell, by contract.

use std::cell::RefCell;
use std::fmt;
use std::rc::Weak;

use crate::event::{SubscriptionId, TreeEvent, TreeObserver};
use crate::node::DataNode;
use crate::property::{Property, PropertyDefaults};
use crate::traverse::Preorder;

/// Generational handle to a node in a [`DataTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}v{}", self.index, self.generation)
    }
}

/// Structural misuse of the tree API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// The handle refers to a node that no longer exists.
    StaleNode,
    /// A root is already present.
    RootOccupied,
    /// Promoting away the root would leave more than one top-level node.
    RootSplit,
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleNode => write!(f, "node handle is stale"),
            Self::RootOccupied => write!(f, "tree already has a root"),
            Self::RootSplit => write!(f, "removing the root would split the tree"),
        }
    }
}

impl std::error::Error for TreeError {}

#[derive(Debug)]
struct NodeEntry {
    data: DataNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    /// `None` indicates a free slot.
    entry: Option<NodeEntry>,
}

/// Weak handle under which observers are registered.
pub type ObserverHandle = Weak<RefCell<dyn TreeObserver>>;

/// A mutable tree of [`DataNode`]s with synchronous change notification.
pub struct DataTree {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    root: Option<NodeId>,
    len: usize,
    observers: Vec<(SubscriptionId, ObserverHandle)>,
    next_subscription: u64,
    defaults: PropertyDefaults,
}

impl fmt::Debug for DataTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTree")
            .field("len", &self.len)
            .field("root", &self.root)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DataTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            root: None,
            len: 0,
            observers: Vec::new(),
            next_subscription: 0,
            defaults: PropertyDefaults::new(),
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The root node, if any.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Whether `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.entry(id).is_some()
    }

    /// The payload of a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&DataNode> {
        self.entry(id).map(|e| &e.data)
    }

    /// Mutable payload access.
    ///
    /// Property edits through this borrow do not fire events; use
    /// [`update_node`](Self::update_node) to announce a content change.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut DataNode> {
        self.entry_mut(id).map(|e| &mut e.data)
    }

    /// The parent of a node, or `None` for the root or a stale handle.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id).and_then(|e| e.parent)
    }

    /// The ordered children of a node (empty for a stale handle).
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.entry(id).map_or(&[], |e| e.children.as_slice())
    }

    /// Pre-order traversal over the whole tree.
    #[must_use]
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder::from_root(self)
    }

    /// Pre-order traversal of the subtree rooted at `id` (inclusive).
    #[must_use]
    pub fn preorder_from(&self, id: NodeId) -> Preorder<'_> {
        Preorder::from_node(self, id)
    }

    // ── Property defaults ───────────────────────────────────────────────

    /// The default-value catalog.
    #[must_use]
    pub fn defaults(&self) -> &PropertyDefaults {
        &self.defaults
    }

    /// Mutable access to the default-value catalog.
    pub fn defaults_mut(&mut self) -> &mut PropertyDefaults {
        &mut self.defaults
    }

    /// Clone the registered prototype for `key`, if any.
    #[must_use]
    pub fn create_default_property(&self, key: &str) -> Option<Property> {
        self.defaults.create(key)
    }

    // ── Structural mutation ─────────────────────────────────────────────

    /// Install the root node. Fires `NodeAdded`.
    pub fn set_root(&mut self, data: DataNode) -> Result<NodeId, TreeError> {
        if self.root.is_some() {
            return Err(TreeError::RootOccupied);
        }
        let id = self.allocate(data, None);
        self.root = Some(id);
        self.notify(&TreeEvent::NodeAdded(id));
        Ok(id)
    }

    /// Append a child under `parent`. Fires `NodeAdded`.
    pub fn add_child(&mut self, parent: NodeId, data: DataNode) -> Result<NodeId, TreeError> {
        let index = self.children(parent).len();
        self.insert_child(parent, index, data)
    }

    /// Insert a child under `parent` at `index` (clamped to the child count).
    /// Fires `NodeAdded`.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        data: DataNode,
    ) -> Result<NodeId, TreeError> {
        if !self.contains(parent) {
            return Err(TreeError::StaleNode);
        }
        let id = self.allocate(data, Some(parent));
        let entry = self.entry_mut(parent).expect("parent checked live");
        let index = index.min(entry.children.len());
        entry.children.insert(index, id);
        self.notify(&TreeEvent::NodeAdded(id));
        Ok(id)
    }

    /// Replace a node's payload in place. Fires `NodeChanged`.
    pub fn replace_node(&mut self, id: NodeId, data: DataNode) -> Result<(), TreeError> {
        let entry = self.entry_mut(id).ok_or(TreeError::StaleNode)?;
        entry.data = data;
        self.notify(&TreeEvent::NodeChanged(id));
        Ok(())
    }

    /// Edit a node's payload through a closure. Fires `NodeChanged`.
    pub fn update_node(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut DataNode),
    ) -> Result<(), TreeError> {
        let entry = self.entry_mut(id).ok_or(TreeError::StaleNode)?;
        f(&mut entry.data);
        self.notify(&TreeEvent::NodeChanged(id));
        Ok(())
    }

    /// Delete a node and its entire subtree.
    ///
    /// Fires `NodePruned` *before* anything is detached, so observers can
    /// still traverse the subtree.
    pub fn prune(&mut self, id: NodeId) -> Result<(), TreeError> {
        if !self.contains(id) {
            return Err(TreeError::StaleNode);
        }
        self.notify(&TreeEvent::NodePruned(id));

        self.detach(id);
        let doomed: Vec<NodeId> = self.preorder_from(id).collect();
        for node in doomed {
            self.release(node);
        }
        Ok(())
    }

    /// Delete a single node, promoting its children to its former parent.
    ///
    /// The children are spliced into the parent's child list at the removed
    /// node's position. Removing the root is only possible while it has at
    /// most one child (the sole child becomes the new root). Fires
    /// `NodeRemoved` *before* the removal.
    pub fn remove_and_promote(&mut self, id: NodeId) -> Result<(), TreeError> {
        let entry = self.entry(id).ok_or(TreeError::StaleNode)?;
        let parent = entry.parent;
        if parent.is_none() && entry.children.len() > 1 {
            return Err(TreeError::RootSplit);
        }
        self.notify(&TreeEvent::NodeRemoved(id));

        let children = std::mem::take(
            &mut self
                .entry_mut(id)
                .expect("node checked live")
                .children,
        );
        match parent {
            Some(parent) => {
                for &child in &children {
                    self.entry_mut(child).expect("child is live").parent = Some(parent);
                }
                let siblings = &mut self.entry_mut(parent).expect("parent is live").children;
                let position = siblings
                    .iter()
                    .position(|&c| c == id)
                    .expect("child listed under its parent");
                siblings.splice(position..=position, children);
            }
            None => {
                let promoted = children.first().copied();
                if let Some(child) = promoted {
                    self.entry_mut(child).expect("child is live").parent = None;
                }
                self.root = promoted;
            }
        }
        self.release(id);
        Ok(())
    }

    // ── Observers ───────────────────────────────────────────────────────

    /// Register an observer, returning its subscription handle.
    ///
    /// Observers are held weakly: a dropped observer is skipped and swept on
    /// the next registration change.
    pub fn subscribe(&mut self, observer: ObserverHandle) -> SubscriptionId {
        self.observers.retain(|(_, weak)| weak.strong_count() > 0);
        let id = SubscriptionId::new(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, observer));
        id
    }

    /// Remove an observer registration.
    pub fn unsubscribe(&mut self, subscription: SubscriptionId) {
        self.observers
            .retain(|(id, weak)| *id != subscription && weak.strong_count() > 0);
    }

    /// Number of live observer registrations.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    fn notify(&self, event: &TreeEvent) {
        for (_, weak) in &self.observers {
            if let Some(observer) = weak.upgrade() {
                observer.borrow_mut().on_tree_event(self, event);
            }
        }
    }

    // ── Slot management ─────────────────────────────────────────────────

    fn entry(&self, id: NodeId) -> Option<&NodeEntry> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut NodeEntry> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn allocate(&mut self, data: DataNode, parent: Option<NodeId>) -> NodeId {
        self.len += 1;
        let entry = NodeEntry {
            data,
            parent,
            children: Vec::new(),
        };
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            NodeId::new(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len()).expect("node count fits in u32");
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            NodeId::new(index, 0)
        }
    }

    /// Unlink `id` from its parent (or the root anchor), leaving the subtree
    /// itself intact.
    fn detach(&mut self, id: NodeId) {
        if self.root == Some(id) {
            self.root = None;
            return;
        }
        if let Some(parent) = self.parent(id) {
            let siblings = &mut self.entry_mut(parent).expect("parent is live").children;
            siblings.retain(|&c| c != id);
        }
    }

    /// Free a single slot. The caller is responsible for links.
    fn release(&mut self, id: NodeId) {
        let slot = &mut self.slots[id.index()];
        debug_assert_eq!(slot.generation, id.generation);
        if slot.entry.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(id.index);
            self.len -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn tree_with_three() -> (DataTree, NodeId, NodeId, NodeId) {
        let mut tree = DataTree::new();
        let root = tree.set_root(DataNode::new()).unwrap();
        let a = tree.add_child(root, DataNode::new()).unwrap();
        let b = tree.add_child(root, DataNode::new()).unwrap();
        (tree, root, a, b)
    }

    #[test]
    fn build_and_query() {
        let (tree, root, a, b) = tree_with_three();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root(), Some(root));
        assert_eq!(tree.children(root), [a, b]);
        assert_eq!(tree.parent(a), Some(root));
        assert!(tree.parent(root).is_none());
    }

    #[test]
    fn second_root_refused() {
        let (mut tree, ..) = tree_with_three();
        assert_eq!(tree.set_root(DataNode::new()), Err(TreeError::RootOccupied));
    }

    #[test]
    fn insert_child_clamps_index() {
        let (mut tree, root, a, b) = tree_with_three();
        let c = tree.insert_child(root, 99, DataNode::new()).unwrap();
        assert_eq!(tree.children(root), [a, b, c]);
        let d = tree.insert_child(root, 0, DataNode::new()).unwrap();
        assert_eq!(tree.children(root), [d, a, b, c]);
    }

    #[test]
    fn prune_removes_subtree_and_invalidates_handles() {
        let (mut tree, root, a, b) = tree_with_three();
        let a1 = tree.add_child(a, DataNode::new()).unwrap();

        tree.prune(a).unwrap();
        assert_eq!(tree.children(root), [b]);
        assert!(!tree.contains(a));
        assert!(!tree.contains(a1));
        assert_eq!(tree.len(), 2);

        assert_eq!(tree.prune(a), Err(TreeError::StaleNode));
    }

    #[test]
    fn stale_handle_does_not_alias_reused_slot() {
        let (mut tree, root, a, _b) = tree_with_three();
        tree.prune(a).unwrap();
        // The freed slot is reused, but with a bumped generation.
        let c = tree.add_child(root, DataNode::new()).unwrap();
        assert!(!tree.contains(a));
        assert!(tree.contains(c));
        assert_ne!(a, c);
    }

    #[test]
    fn remove_and_promote_splices_children_in_place() {
        let (mut tree, root, a, b) = tree_with_three();
        let a1 = tree.add_child(a, DataNode::new()).unwrap();
        let a2 = tree.add_child(a, DataNode::new()).unwrap();

        tree.remove_and_promote(a).unwrap();
        assert_eq!(tree.children(root), [a1, a2, b]);
        assert_eq!(tree.parent(a1), Some(root));
        assert_eq!(tree.parent(a2), Some(root));
        assert!(!tree.contains(a));
    }

    #[test]
    fn remove_and_promote_root() {
        let mut tree = DataTree::new();
        let root = tree.set_root(DataNode::new()).unwrap();
        let only = tree.add_child(root, DataNode::new()).unwrap();

        tree.remove_and_promote(root).unwrap();
        assert_eq!(tree.root(), Some(only));
        assert!(tree.parent(only).is_none());

        tree.remove_and_promote(only).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.root(), None);
    }

    #[test]
    fn remove_and_promote_root_with_two_children_refused() {
        let (mut tree, root, ..) = tree_with_three();
        assert_eq!(tree.remove_and_promote(root), Err(TreeError::RootSplit));
    }

    struct Recorder {
        events: Vec<(TreeEvent, usize)>,
    }

    impl TreeObserver for Recorder {
        fn on_tree_event(&mut self, tree: &DataTree, event: &TreeEvent) {
            // Record the tree size seen by the handler to pin the ordering
            // contract: prune/remove fire before, add/change after.
            self.events.push((*event, tree.len()));
        }
    }

    #[test]
    fn notification_ordering() {
        let mut tree = DataTree::new();
        let recorder = Rc::new(RefCell::new(Recorder { events: Vec::new() }));
        tree.subscribe(Rc::downgrade(&(Rc::clone(&recorder) as Rc<RefCell<dyn TreeObserver>>)));

        let root = tree.set_root(DataNode::new()).unwrap();
        let a = tree.add_child(root, DataNode::new()).unwrap();
        tree.update_node(a, |n| n.set_property("k", Property::Int(1)))
            .unwrap();
        tree.prune(a).unwrap();

        let events = recorder.borrow().events.clone();
        assert_eq!(
            events,
            vec![
                (TreeEvent::NodeAdded(root), 1),
                (TreeEvent::NodeAdded(a), 2),
                (TreeEvent::NodeChanged(a), 2),
                // Pruned fires while the node is still present.
                (TreeEvent::NodePruned(a), 2),
            ]
        );
    }

    #[test]
    fn pruned_subtree_still_traversable_in_handler() {
        struct SubtreeCounter {
            seen: usize,
        }
        impl TreeObserver for SubtreeCounter {
            fn on_tree_event(&mut self, tree: &DataTree, event: &TreeEvent) {
                if let TreeEvent::NodePruned(id) = event {
                    self.seen = tree.preorder_from(*id).count();
                }
            }
        }

        let (mut tree, _root, a, _b) = tree_with_three();
        tree.add_child(a, DataNode::new()).unwrap();
        tree.add_child(a, DataNode::new()).unwrap();

        let counter = Rc::new(RefCell::new(SubtreeCounter { seen: 0 }));
        tree.subscribe(Rc::downgrade(&(Rc::clone(&counter) as Rc<RefCell<dyn TreeObserver>>)));
        tree.prune(a).unwrap();
        assert_eq!(counter.borrow().seen, 3);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut tree = DataTree::new();
        let recorder = Rc::new(RefCell::new(Recorder { events: Vec::new() }));
        let sub = tree.subscribe(Rc::downgrade(&(Rc::clone(&recorder) as Rc<RefCell<dyn TreeObserver>>)));
        tree.unsubscribe(sub);

        tree.set_root(DataNode::new()).unwrap();
        assert!(recorder.borrow().events.is_empty());
        assert_eq!(tree.observer_count(), 0);
    }

    #[test]
    fn dropped_observer_is_skipped() {
        let mut tree = DataTree::new();
        let recorder = Rc::new(RefCell::new(Recorder { events: Vec::new() }));
        tree.subscribe(Rc::downgrade(&(Rc::clone(&recorder) as Rc<RefCell<dyn TreeObserver>>)));
        drop(recorder);
        tree.set_root(DataNode::new()).unwrap(); // no panic, no delivery
        assert_eq!(tree.observer_count(), 0);
    }
}
