#![forbid(unsafe_code)]

//! Arena-backed data tree with typed node properties and structural change
//! notifications.
//!
//! A [`DataTree`] stores identity-bearing nodes addressed by generational
//! [`NodeId`] handles. Each node carries a bag of named [`Property`] values
//! (plus optional per-scope overlay bags) and an ordered child list. The four
//! structural mutations — add, change, prune, remove-with-promotion — notify
//! registered [`TreeObserver`]s synchronously with a [`TreeEvent`], so that
//! derived views can patch themselves incrementally.
//!
//! # Example
//!
//! ```
//! use larch_core::{DataNode, DataTree, Property};
//!
//! let mut tree = DataTree::new();
//! let root = tree.set_root(DataNode::new()).unwrap();
//! let child = tree
//!     .add_child(root, DataNode::new().with_property("name", Property::text("sample")))
//!     .unwrap();
//!
//! assert_eq!(tree.parent(child), Some(root));
//! assert_eq!(tree.children(root), [child]);
//! ```

pub mod event;
pub mod node;
pub mod property;
pub mod traverse;
pub mod tree;

pub use event::{SubscriptionId, TreeEvent, TreeObserver};
pub use node::{DataNode, ScopeId};
pub use property::{Property, PropertyDefaults};
pub use traverse::Preorder;
pub use tree::{DataTree, NodeId, ObserverHandle, TreeError};
