#![forbid(unsafe_code)]

//! The projection engine.
//!
//! A [`TreeFilter`] maintains a filtered, selectable view over one
//! [`DataTree`] for its whole lifetime. It subscribes to the tree's
//! structural events at construction and reacts to each of the four kinds by
//! patching its item forest incrementally, falling back to full regeneration
//! where a patch would be unsound. Consumers read the forest through
//! [`ItemId`] handles and learn about changes from [`ViewEvent`]s.
//!
//! # Design Invariants
//!
//! 1. **Index contiguity**: after any handler returns, every sibling list
//!    (the root list or an item's children) is indexed `0..n` with no gaps.
//! 2. **Registry consistency**: every live item has exactly one registry
//!    entry under its node; releasing an item removes its registry entry and
//!    its selection-set membership.
//! 3. **Single steady state**: the engine is a passive reactor; every
//!    handler restores "consistent with the last-seen tree" before it
//!    returns, on the incremental and the regeneration path alike.
//! 4. **Handle hygiene**: consumers must not resolve retained [`ItemId`]s
//!    across a notification boundary; the notified change may have
//!    invalidated them.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use larch_core::{
    DataTree, NodeId, ScopeId, SubscriptionId, TreeEvent, TreeObserver,
};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

use crate::accessor::PropertyAccessor;
use crate::event::{SinkId, ViewEvent, ViewEventSink};
use crate::filter::{FilterFn, accept_all};
use crate::item::{Item, ItemArena, ItemId};

/// How the projection treats the nesting of matching nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HierarchyHandling {
    /// Matching nodes keep their nesting relative to the nearest matching
    /// ancestor; non-matching ancestors are transparent.
    #[default]
    PreserveHierarchy,
    /// All matching nodes appear as siblings regardless of nesting depth.
    Flatten,
}

/// How many items may be selected at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectionMode {
    /// At most one selected item; selecting a new one evicts the previous.
    Single,
    /// Any number of selected items.
    #[default]
    Multi,
}

/// A sibling list inside the projection: the root list or some item's
/// children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetList {
    Roots,
    ChildrenOf(ItemId),
}

impl TargetList {
    fn for_parent(parent: Option<ItemId>) -> Self {
        match parent {
            Some(id) => Self::ChildrenOf(id),
            None => Self::Roots,
        }
    }
}

/// A filtered, selectable, observable projection of a [`DataTree`].
///
/// Constructed with [`TreeFilter::new`], which binds the engine to one tree
/// for its whole lifetime and performs the initial generation. Dropping the
/// engine unsubscribes from the tree and emits a final
/// [`ViewEvent::ResetAll`].
pub struct TreeFilter {
    tree: Rc<RefCell<DataTree>>,
    subscription: Option<SubscriptionId>,
    filter: FilterFn,
    hierarchy: HierarchyHandling,
    selection_mode: SelectionMode,
    items: ItemArena,
    roots: Vec<ItemId>,
    registry: HashMap<NodeId, ItemId>,
    selected: BTreeSet<ItemId>,
    last_selected: Option<ItemId>,
    visible_properties: Vec<String>,
    editable_properties: Vec<String>,
    property_labels: Vec<(String, String)>,
    scope: Option<ScopeId>,
    sinks: Vec<(SinkId, ViewEventSink)>,
    next_sink: u64,
}

impl fmt::Debug for TreeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeFilter")
            .field("items", &self.items.len())
            .field("roots", &self.roots)
            .field("hierarchy", &self.hierarchy)
            .field("selection_mode", &self.selection_mode)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

impl TreeFilter {
    /// Create a projection bound to `tree` and generate the initial forest.
    ///
    /// The engine registers itself as a tree observer, which is why it lives
    /// in an `Rc<RefCell<_>>`: the tree holds it weakly and delivers events
    /// through that handle.
    #[must_use]
    pub fn new(tree: Rc<RefCell<DataTree>>) -> Rc<RefCell<Self>> {
        let engine = Rc::new(RefCell::new(Self {
            tree: Rc::clone(&tree),
            subscription: None,
            filter: accept_all,
            hierarchy: HierarchyHandling::default(),
            selection_mode: SelectionMode::default(),
            items: ItemArena::new(),
            roots: Vec::new(),
            registry: HashMap::new(),
            selected: BTreeSet::new(),
            last_selected: None,
            visible_properties: Vec::new(),
            editable_properties: Vec::new(),
            property_labels: Vec::new(),
            scope: None,
            sinks: Vec::new(),
            next_sink: 0,
        }));
        let observer: Rc<RefCell<dyn TreeObserver>> = Rc::clone(&engine) as _;
        let subscription = tree
            .borrow_mut()
            .subscribe(Rc::downgrade(&observer));
        engine.borrow_mut().subscription = Some(subscription);
        {
            let guard = tree.borrow();
            engine.borrow_mut().regenerate(&guard);
        }
        engine
    }

    // ── Configuration ───────────────────────────────────────────────────

    /// Replace the filter predicate; `None` restores the accept-all default.
    ///
    /// Passing the currently-active predicate is a no-op: no regeneration,
    /// no events.
    pub fn set_filter(&mut self, filter: Option<FilterFn>) {
        let next = filter.unwrap_or(accept_all);
        if std::ptr::fn_addr_eq(self.filter, next) {
            return;
        }
        self.filter = next;
        self.regenerate_from_bound_tree();
    }

    /// The active filter predicate.
    #[must_use]
    pub fn filter(&self) -> FilterFn {
        self.filter
    }

    /// Switch between hierarchy mirroring and flattening. No-op when
    /// unchanged; otherwise the projection is fully regenerated.
    pub fn set_hierarchy_handling(&mut self, hierarchy: HierarchyHandling) {
        if self.hierarchy == hierarchy {
            return;
        }
        self.hierarchy = hierarchy;
        self.regenerate_from_bound_tree();
    }

    /// The active hierarchy handling.
    #[must_use]
    pub fn hierarchy_handling(&self) -> HierarchyHandling {
        self.hierarchy
    }

    /// Switch the selection mode.
    ///
    /// Switching from [`SelectionMode::Multi`] to [`SelectionMode::Single`]
    /// does not collapse an existing multi-selection; the invariant is only
    /// enforced from the next [`select_item`](Self::select_item) on.
    pub fn set_selection_mode(&mut self, selection_mode: SelectionMode) {
        self.selection_mode = selection_mode;
    }

    /// The active selection mode.
    #[must_use]
    pub fn selection_mode(&self) -> SelectionMode {
        self.selection_mode
    }

    /// Set the keys exposed through [`property`](Self::property).
    pub fn set_visible_properties(
        &mut self,
        keys: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.visible_properties = keys.into_iter().map(Into::into).collect();
        self.emit(ViewEvent::UpdateAll);
    }

    /// The visible property keys.
    #[must_use]
    pub fn visible_properties(&self) -> &[String] {
        &self.visible_properties
    }

    /// Set the keys whose accessors permit writes.
    pub fn set_editable_properties(
        &mut self,
        keys: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.editable_properties = keys.into_iter().map(Into::into).collect();
        self.emit(ViewEvent::UpdateAll);
    }

    /// The editable property keys.
    #[must_use]
    pub fn editable_properties(&self) -> &[String] {
        &self.editable_properties
    }

    /// Set the ordered (key, display label) list passed through to
    /// consumers. Opaque to the engine's own logic.
    pub fn set_property_labels(
        &mut self,
        labels: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) {
        self.property_labels = labels
            .into_iter()
            .map(|(k, l)| (k.into(), l.into()))
            .collect();
        self.emit(ViewEvent::UpdateAll);
    }

    /// The (key, display label) pass-through list.
    #[must_use]
    pub fn property_labels(&self) -> &[(String, String)] {
        &self.property_labels
    }

    /// Bind the scope used for property lookups, or `None` for base-bag
    /// lookups only.
    pub fn set_scope(&mut self, scope: Option<ScopeId>) {
        self.scope = scope;
        self.emit(ViewEvent::UpdateAll);
    }

    /// The bound property-lookup scope.
    #[must_use]
    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    // ── Forest access ───────────────────────────────────────────────────

    /// The ordered top-level items.
    #[must_use]
    pub fn root_items(&self) -> &[ItemId] {
        &self.roots
    }

    /// Resolve an item handle.
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    /// The item projecting `node`, if the node is part of the projection.
    #[must_use]
    pub fn item_for_node(&self, node: NodeId) -> Option<ItemId> {
        self.registry.get(&node).copied()
    }

    /// Number of live items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the projection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Walk the projection in display order (pre-order, siblings by index).
    #[must_use]
    pub fn iter(&self) -> ProjectionIter<'_> {
        ProjectionIter {
            view: self,
            stack: self.roots.iter().rev().copied().collect(),
        }
    }

    // ── Selection ───────────────────────────────────────────────────────

    /// Change an item's selection state. The only selection entry point.
    ///
    /// No-op on a stale handle or when the state would not change. In
    /// [`SelectionMode::Single`], selecting a new item first deselects the
    /// previously-selected one — that eviction emits no event of its own;
    /// exactly one [`ViewEvent::SelectionChanged`] fires, for `item`.
    pub fn select_item(&mut self, item: ItemId, selected: bool) {
        if !self.items.contains(item) {
            trace!(%item, "select on stale item ignored");
            return;
        }
        if self.apply_selection(item, selected) {
            self.emit(ViewEvent::SelectionChanged { item, selected });
        }
    }

    /// Selected items, in handle order.
    pub fn selected_items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.selected.iter().copied()
    }

    /// Number of selected items.
    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// The most recently selected item, if it still exists.
    #[must_use]
    pub fn last_selected_item(&self) -> Option<ItemId> {
        self.last_selected
    }

    fn apply_selection(&mut self, item: ItemId, selected: bool) -> bool {
        let current = self.items.get(item).is_some_and(|i| i.selected);
        if current == selected {
            return false;
        }
        if selected {
            if self.selection_mode == SelectionMode::Single {
                if let Some(previous) = self.last_selected {
                    if previous != item {
                        // The evicted item is deselected without an event of
                        // its own; see the selection scenario tests.
                        if let Some(prev) = self.items.get_mut(previous) {
                            prev.selected = false;
                        }
                        self.selected.remove(&previous);
                    }
                }
            }
            self.items.get_mut(item).expect("item checked live").selected = true;
            self.last_selected = Some(item);
            self.selected.insert(item);
        } else {
            self.items.get_mut(item).expect("item checked live").selected = false;
            self.selected.remove(&item);
        }
        true
    }

    // ── Property access ─────────────────────────────────────────────────

    /// Build a guarded accessor for one property of one item's node.
    ///
    /// Returns `None` only for a stale item handle. A key outside the
    /// visible set yields a null accessor (reads as absent, refuses writes).
    /// A visible key absent on the node is materialized from the tree's
    /// default catalog and attached to the node's base bag, when a prototype
    /// is registered.
    #[must_use]
    pub fn property(&self, item: ItemId, key: &str) -> Option<PropertyAccessor> {
        let node = self.items.get(item)?.node;
        let visible = self.visible_properties.iter().any(|k| k == key);
        if !visible {
            return Some(PropertyAccessor::new(
                Rc::clone(&self.tree),
                node,
                key,
                self.scope,
                false,
                false,
            ));
        }
        let editable = self.editable_properties.iter().any(|k| k == key);
        {
            let mut tree = self.tree.borrow_mut();
            let absent = tree
                .node(node)
                .is_none_or(|n| n.property_scoped(key, self.scope).is_none());
            if absent {
                if let Some(default) = tree.create_default_property(key) {
                    trace!(%node, key, "materialized default property");
                    if let Some(data) = tree.node_mut(node) {
                        data.set_property(key, default);
                    }
                }
            }
        }
        Some(PropertyAccessor::new(
            Rc::clone(&self.tree),
            node,
            key,
            self.scope,
            true,
            editable,
        ))
    }

    // ── Event sinks ─────────────────────────────────────────────────────

    /// Register a sink for outbound [`ViewEvent`]s.
    pub fn observe(&mut self, sink: impl FnMut(&ViewEvent) + 'static) -> SinkId {
        let id = SinkId::new(self.next_sink);
        self.next_sink += 1;
        self.sinks.push((id, Box::new(sink)));
        id
    }

    /// Remove a sink registration.
    pub fn unobserve(&mut self, sink: SinkId) {
        self.sinks.retain(|(id, _)| *id != sink);
    }

    fn emit(&mut self, event: ViewEvent) {
        trace!(?event, "projection event");
        for (_, sink) in &mut self.sinks {
            sink(&event);
        }
    }

    // ── Forest maintenance ──────────────────────────────────────────────

    fn list(&self, target: TargetList) -> &[ItemId] {
        match target {
            TargetList::Roots => &self.roots,
            TargetList::ChildrenOf(id) => {
                self.items.get(id).map_or(&[], |item| item.children.as_slice())
            }
        }
    }

    fn list_mut(&mut self, target: TargetList) -> &mut Vec<ItemId> {
        match target {
            TargetList::Roots => &mut self.roots,
            TargetList::ChildrenOf(id) => {
                &mut self
                    .items
                    .get_mut(id)
                    .expect("target list parent is live")
                    .children
            }
        }
    }

    /// Create an item for `node` at the tail of `target` and announce it.
    fn push_item(&mut self, node: NodeId, target: TargetList, parent: Option<ItemId>) -> ItemId {
        let index = self.list(target).len();
        let id = self.items.insert(Item::new(node, parent, index));
        self.list_mut(target).push(id);
        self.registry.insert(node, id);
        self.emit(ViewEvent::ItemAdded(id));
        id
    }

    /// Release an item and its owned subtree: arena slots, registry entries
    /// and selection memberships all go. The caller owns the list unlink.
    fn release(&mut self, id: ItemId) {
        if let Some(item) = self.items.remove(id) {
            self.registry.remove(&item.node);
            self.selected.remove(&id);
            if self.last_selected == Some(id) {
                self.last_selected = None;
            }
            for child in item.children {
                self.release(child);
            }
        }
    }

    /// Re-index `target` to `0..n` and re-announce every surviving item
    /// (the added-event reuse for renumbering).
    fn renumber_and_announce(&mut self, target: TargetList) {
        let ids: Vec<ItemId> = self.list(target).to_vec();
        for (index, id) in ids.into_iter().enumerate() {
            if let Some(item) = self.items.get_mut(id) {
                item.index = index;
            }
            self.emit(ViewEvent::ItemAdded(id));
        }
    }

    /// Walk `node`'s children, appending an item to `target` for every match
    /// and recursing per the hierarchy mode; non-matching nodes are
    /// transparent.
    fn add_matching_children(
        &mut self,
        tree: &DataTree,
        node: NodeId,
        target: TargetList,
        parent: Option<ItemId>,
    ) {
        for &child in tree.children(node) {
            let Some(data) = tree.node(child) else { continue };
            if (self.filter)(data) {
                let id = self.push_item(child, target, parent);
                match self.hierarchy {
                    HierarchyHandling::PreserveHierarchy => {
                        self.add_matching_children(
                            tree,
                            child,
                            TargetList::ChildrenOf(id),
                            Some(id),
                        );
                    }
                    HierarchyHandling::Flatten => {
                        self.add_matching_children(tree, child, target, parent);
                    }
                }
            } else {
                self.add_matching_children(tree, child, target, parent);
            }
        }
    }

    /// Discard and rebuild the whole forest from the tree.
    fn regenerate(&mut self, tree: &DataTree) {
        self.emit(ViewEvent::ResetAll);
        for root in std::mem::take(&mut self.roots) {
            self.release(root);
        }
        debug_assert!(self.items.is_empty());
        debug_assert!(self.registry.is_empty());
        debug_assert!(self.selected.is_empty());

        if let Some(root) = tree.root() {
            let matches = tree.node(root).is_some_and(|data| (self.filter)(data));
            if matches {
                let id = self.push_item(root, TargetList::Roots, None);
                match self.hierarchy {
                    HierarchyHandling::PreserveHierarchy => {
                        self.add_matching_children(
                            tree,
                            root,
                            TargetList::ChildrenOf(id),
                            Some(id),
                        );
                    }
                    HierarchyHandling::Flatten => {
                        self.add_matching_children(tree, root, TargetList::Roots, None);
                    }
                }
            } else {
                self.add_matching_children(tree, root, TargetList::Roots, None);
            }
        }
        debug!(items = self.items.len(), "regenerated projection");
        self.emit(ViewEvent::UpdateAll);
    }

    /// Regenerate outside a notification, borrowing the bound tree.
    fn regenerate_from_bound_tree(&mut self) {
        let tree = Rc::clone(&self.tree);
        let guard = tree.borrow();
        self.regenerate(&guard);
    }

    // ── Event handlers ──────────────────────────────────────────────────

    fn on_node_changed(&mut self, tree: &DataTree, node: NodeId) {
        // A change announced for a node that is already gone is the tree's
        // own teardown artifact; there is nothing left to project.
        if !tree.contains(node) {
            return;
        }
        self.regenerate(tree);
    }

    fn on_node_added(&mut self, tree: &DataTree, node: NodeId) {
        let Some(data) = tree.node(node) else { return };
        if !(self.filter)(data) {
            trace!(%node, "added node rejected by filter");
            return;
        }

        // Rebuild the smallest enclosing matched subtree: walk up for the
        // nearest ancestor that already has an item, and regenerate its
        // children wholesale. Only meaningful while hierarchy is preserved;
        // flattened forests go through full regeneration.
        if self.hierarchy == HierarchyHandling::PreserveHierarchy {
            let mut ancestor = tree.parent(node);
            while let Some(current) = ancestor {
                if let Some(&parent_item) = self.registry.get(&current) {
                    debug!(%node, parent = %parent_item, "rebuilding enclosing subtree");
                    self.emit(ViewEvent::RemoveChildren(Some(parent_item)));
                    let children = match self.items.get_mut(parent_item) {
                        Some(item) => std::mem::take(&mut item.children),
                        None => Vec::new(),
                    };
                    for child in children {
                        self.release(child);
                    }
                    self.add_matching_children(
                        tree,
                        current,
                        TargetList::ChildrenOf(parent_item),
                        Some(parent_item),
                    );
                    return;
                }
                ancestor = tree.parent(current);
            }
        }
        self.regenerate(tree);
    }

    fn on_node_pruned(&mut self, tree: &DataTree, node: NodeId) {
        // Preserved hierarchy and the pruned node itself is projected: that
        // one item goes, and its owned subtree cascades with it.
        if self.hierarchy == HierarchyHandling::PreserveHierarchy {
            if let Some(&item_id) = self.registry.get(&node) {
                let parent = self
                    .items
                    .get(item_id)
                    .expect("registry maps to live item")
                    .parent;
                let target = TargetList::for_parent(parent);
                self.emit(ViewEvent::RemoveChildren(parent));
                self.list_mut(target).retain(|&id| id != item_id);
                self.release(item_id);
                self.renumber_and_announce(target);
                return;
            }
        }

        // Otherwise the doomed subtree's projected nodes form a contiguous
        // range in their host list: the first match fixes the range start,
        // every further match hosted in the same list extends it by one.
        // Matches nested below another match are owned by it and cascade on
        // release, so they do not extend the range.
        let mut range: Option<(TargetList, Option<ItemId>, usize, usize)> = None;
        for doomed in tree.preorder_from(node) {
            let Some(&item_id) = self.registry.get(&doomed) else {
                continue;
            };
            match &mut range {
                None => {
                    let parent = self
                        .items
                        .get(item_id)
                        .expect("registry maps to live item")
                        .parent;
                    let target = TargetList::for_parent(parent);
                    let start = self
                        .list(target)
                        .iter()
                        .position(|&id| id == item_id)
                        .expect("item is listed under its parent");
                    range = Some((target, parent, start, 1));
                }
                Some((_, parent, _, count)) => {
                    if self.items.get(item_id).is_some_and(|i| i.parent == *parent) {
                        *count += 1;
                    }
                }
            }
        }
        let Some((target, parent, start, count)) = range else {
            trace!(%node, "pruned subtree contained no projected items");
            return;
        };

        self.emit(ViewEvent::RemoveChildren(parent));
        let removed: Vec<ItemId> = self.list_mut(target).drain(start..start + count).collect();
        for id in removed {
            self.release(id);
        }
        self.renumber_and_announce(target);
    }

    fn on_node_removed(&mut self, _tree: &DataTree, node: NodeId) {
        // The removed node's children are promoted in the underlying tree.
        // Without an item of its own there is nothing to patch: descendants
        // already attach past it, and the promotion keeps that attachment.
        let Some(&item_id) = self.registry.get(&node) else {
            return;
        };
        let (parent, children) = {
            let item = self.items.get(item_id).expect("registry maps to live item");
            (item.parent, item.children.clone())
        };
        let target = TargetList::for_parent(parent);

        for &child in &children {
            if let Some(item) = self.items.get_mut(child) {
                item.parent = parent;
            }
        }
        {
            let list = self.list_mut(target);
            let position = list
                .iter()
                .position(|&id| id == item_id)
                .expect("item is listed under its parent");
            list.splice(position..=position, children.iter().copied());
        }
        // The children moved out above; emptying the link list keeps the
        // release from cascading into them.
        self.items
            .get_mut(item_id)
            .expect("item is live")
            .children
            .clear();
        self.release(item_id);

        self.emit(ViewEvent::RemoveChildren(parent));
        self.renumber_and_announce(target);
    }
}

impl TreeObserver for TreeFilter {
    fn on_tree_event(&mut self, tree: &DataTree, event: &TreeEvent) {
        match event {
            TreeEvent::NodeChanged(id) => self.on_node_changed(tree, *id),
            TreeEvent::NodeAdded(id) => self.on_node_added(tree, *id),
            TreeEvent::NodePruned(id) => self.on_node_pruned(tree, *id),
            TreeEvent::NodeRemoved(id) => self.on_node_removed(tree, *id),
        }
    }
}

impl Drop for TreeFilter {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            // Skipped when the tree cell is busy (teardown during delivery);
            // the tree sweeps dead weak observers on its own.
            if let Ok(mut tree) = self.tree.try_borrow_mut() {
                tree.unsubscribe(subscription);
            }
        }
        self.emit(ViewEvent::ResetAll);
    }
}

/// Display-order iterator over the projection, yielding item handles.
#[derive(Debug)]
pub struct ProjectionIter<'a> {
    view: &'a TreeFilter,
    stack: Vec<ItemId>,
}

impl Iterator for ProjectionIter<'_> {
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        let next = self.stack.pop()?;
        if let Some(item) = self.view.item(next) {
            self.stack.extend(item.children.iter().rev().copied());
        }
        Some(next)
    }
}
