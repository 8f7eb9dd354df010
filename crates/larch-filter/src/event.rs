#![forbid(unsafe_code)]

//! Outbound projection-change events.
//!
//! The engine announces every observable projection change as a [`ViewEvent`]
//! pushed synchronously to each registered sink. Sinks must not call back
//! into the engine from inside a delivery, and must not resolve retained
//! [`ItemId`]s across a delivery boundary: the event they are handling may be
//! the one that invalidated them.

use crate::item::ItemId;

/// A change in the projection, as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    /// The entire projection is invalidated; discard all cached item handles.
    ResetAll,

    /// The projection was fully rebuilt; re-read from scratch.
    UpdateAll,

    /// One new item appeared. Also reused to re-announce an item whose index
    /// changed during renumbering.
    ItemAdded(ItemId),

    /// All children of the given item — or all root items for `None` — are
    /// about to be invalidated.
    RemoveChildren(Option<ItemId>),

    /// An item's selection state changed through
    /// [`select_item`](crate::TreeFilter::select_item).
    SelectionChanged {
        /// The affected item.
        item: ItemId,
        /// Its new selection state.
        selected: bool,
    },
}

/// Handle identifying one sink registration, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

impl SinkId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

pub(crate) type ViewEventSink = Box<dyn FnMut(&ViewEvent)>;
