#![forbid(unsafe_code)]

//! Filtered, selectable, observable projections over a
//! [`larch_core::DataTree`].
//!
//! A [`TreeFilter`] mirrors (or flattens) the subset of a tree's nodes that
//! pass a predicate into a forest of lightweight [`Item`]s, keeps that forest
//! consistent under structural tree mutation by incremental patching, tracks
//! a selection set with single/multi modes, and hands out guarded
//! [`PropertyAccessor`]s over node properties.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use larch_core::{DataNode, DataTree, Property};
//! use larch_filter::{HierarchyHandling, TreeFilter, filter::is_visible};
//!
//! let mut tree = DataTree::new();
//! let root = tree.set_root(DataNode::new()).unwrap();
//! tree.add_child(
//!     root,
//!     DataNode::new().with_property("visible", Property::Bool(true)),
//! )
//! .unwrap();
//!
//! let tree = Rc::new(RefCell::new(tree));
//! let view = TreeFilter::new(Rc::clone(&tree));
//! view.borrow_mut().set_filter(Some(is_visible));
//! view.borrow_mut()
//!     .set_hierarchy_handling(HierarchyHandling::Flatten);
//!
//! assert_eq!(view.borrow().root_items().len(), 1);
//! ```

pub mod accessor;
pub mod event;
pub mod filter;
pub mod item;
pub mod view;

pub use accessor::{NO_VALUE, PermissionError, PropertyAccessor};
pub use event::{SinkId, ViewEvent};
pub use filter::FilterFn;
pub use item::{Item, ItemId};
pub use view::{HierarchyHandling, ProjectionIter, SelectionMode, TreeFilter};
