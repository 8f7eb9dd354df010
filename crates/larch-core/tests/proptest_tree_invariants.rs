#![forbid(unsafe_code)]

//! Property-based invariant tests for the data tree.
//!
//! These verify structural invariants that must hold after any sequence of
//! mutations:
//!
//! 1. `len()` equals the pre-order node count.
//! 2. Parent/child links are bidirectional and the root has no parent.
//! 3. Sibling lists never contain duplicates or dead handles.
//! 4. Freed handles stay dead even when their slot is reused.

use larch_core::{DataNode, DataTree, NodeId};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

#[derive(Debug, Clone)]
enum Op {
    Add { slot: usize, at: usize },
    Prune { slot: usize },
    Promote { slot: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<usize>(), any::<usize>()).prop_map(|(slot, at)| Op::Add { slot, at }),
        1 => any::<usize>().prop_map(|slot| Op::Prune { slot }),
        1 => any::<usize>().prop_map(|slot| Op::Promote { slot }),
    ]
}

fn live_nodes(tree: &DataTree) -> Vec<NodeId> {
    tree.preorder().collect()
}

fn check_invariants(tree: &DataTree, dead: &[NodeId]) -> Result<(), TestCaseError> {
    let live = live_nodes(tree);
    prop_assert_eq!(tree.len(), live.len());
    prop_assert_eq!(tree.is_empty(), live.is_empty());

    if let Some(root) = tree.root() {
        prop_assert!(tree.contains(root));
        prop_assert_eq!(tree.parent(root), None);
    }

    for &node in &live {
        prop_assert!(tree.contains(node));
        match tree.parent(node) {
            Some(parent) => {
                prop_assert!(tree.children(parent).contains(&node));
            }
            None => prop_assert_eq!(tree.root(), Some(node)),
        }
        let children = tree.children(node);
        for (position, &child) in children.iter().enumerate() {
            prop_assert!(tree.contains(child));
            prop_assert_eq!(tree.parent(child), Some(node));
            // No duplicate entries in a sibling list.
            prop_assert_eq!(
                children.iter().position(|&c| c == child),
                Some(position)
            );
        }
    }

    for &node in dead {
        prop_assert!(!tree.contains(node));
        prop_assert_eq!(tree.node(node), None);
        prop_assert_eq!(tree.children(node), &[] as &[NodeId]);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn invariants_hold_under_random_mutation(
        ops in proptest::collection::vec(op_strategy(), 1..48),
    ) {
        let mut tree = DataTree::new();
        let mut dead: Vec<NodeId> = Vec::new();

        for op in &ops {
            match *op {
                Op::Add { slot, at } => {
                    let live = live_nodes(&tree);
                    if live.is_empty() {
                        tree.set_root(DataNode::new()).unwrap();
                    } else {
                        let parent = live[slot % live.len()];
                        let index = at % (tree.children(parent).len() + 1);
                        tree.insert_child(parent, index, DataNode::new()).unwrap();
                    }
                }
                Op::Prune { slot } => {
                    let live = live_nodes(&tree);
                    if let Some(&target) = live.get(slot % live.len().max(1)) {
                        dead.extend(tree.preorder_from(target));
                        tree.prune(target).unwrap();
                    }
                }
                Op::Promote { slot } => {
                    let live = live_nodes(&tree);
                    if let Some(&target) = live.get(slot % live.len().max(1)) {
                        if tree.remove_and_promote(target).is_ok() {
                            dead.push(target);
                        }
                    }
                }
            }
            check_invariants(&tree, &dead)?;
        }
    }
}
