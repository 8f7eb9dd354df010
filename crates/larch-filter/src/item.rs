#![forbid(unsafe_code)]

//! View items and the arena that owns them.
//!
//! Items are addressed by generational [`ItemId`] handles and resolved
//! through the owning [`TreeFilter`](crate::TreeFilter); nothing outside the
//! engine ever holds a direct reference. Slot reuse bumps the generation, so
//! a handle that survived a projection change can never alias a new item.

use std::fmt;

use larch_core::NodeId;

/// Generational handle to a view item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId {
    index: u32,
    generation: u32,
}

impl ItemId {
    fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}v{}", self.index, self.generation)
    }
}

/// One projected node: selection state, sibling index, and structure links.
#[derive(Debug, Clone)]
pub struct Item {
    pub(crate) node: NodeId,
    pub(crate) parent: Option<ItemId>,
    pub(crate) children: Vec<ItemId>,
    pub(crate) index: usize,
    pub(crate) selected: bool,
}

impl Item {
    pub(crate) fn new(node: NodeId, parent: Option<ItemId>, index: usize) -> Self {
        Self {
            node,
            parent,
            children: Vec::new(),
            index,
            selected: false,
        }
    }

    /// The underlying node this item projects.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The owning item, or `None` for a top-level item.
    #[must_use]
    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    /// The ordered child items.
    #[must_use]
    pub fn children(&self) -> &[ItemId] {
        &self.children
    }

    /// Whether this item has children in the projection.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Position among siblings (0-based, contiguous).
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether this item sits in the root list.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether this item is selected.
    #[must_use]
    pub fn is_selected(&self) -> bool {
        self.selected
    }
}

#[derive(Debug)]
struct ItemSlot {
    generation: u32,
    /// `None` indicates a free slot.
    item: Option<Item>,
}

/// Slot arena owning every live item of one projection.
#[derive(Debug, Default)]
pub(crate) struct ItemArena {
    slots: Vec<ItemSlot>,
    free_list: Vec<u32>,
    len: usize,
}

impl ItemArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn get(&self, id: ItemId) -> Option<&Item> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.item.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.item.as_mut()
    }

    pub(crate) fn insert(&mut self, item: Item) -> ItemId {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.item = Some(item);
            ItemId::new(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len()).expect("item count fits in u32");
            self.slots.push(ItemSlot {
                generation: 0,
                item: Some(item),
            });
            ItemId::new(index, 0)
        }
    }

    pub(crate) fn remove(&mut self, id: ItemId) -> Option<Item> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let item = slot.item.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.len -= 1;
        Some(item)
    }
}
