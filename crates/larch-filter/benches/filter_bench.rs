//! Benchmarks for projection maintenance.
//!
//! Run with: cargo bench -p larch-filter

use std::cell::RefCell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use larch_core::{DataNode, DataTree, NodeId, Property};
use larch_filter::TreeFilter;
use larch_filter::filter::is_visible;

/// Balanced tree with the given fanout and depth; every other node visible.
fn build_tree(fanout: usize, depth: usize) -> (Rc<RefCell<DataTree>>, NodeId) {
    fn grow(tree: &mut DataTree, parent: NodeId, fanout: usize, depth: usize, toggle: &mut bool) {
        if depth == 0 {
            return;
        }
        for _ in 0..fanout {
            *toggle = !*toggle;
            let child = tree
                .add_child(
                    parent,
                    DataNode::new().with_property("visible", Property::Bool(*toggle)),
                )
                .unwrap();
            grow(tree, child, fanout, depth - 1, toggle);
        }
    }

    let mut tree = DataTree::new();
    let root = tree
        .set_root(DataNode::new().with_property("visible", Property::Bool(true)))
        .unwrap();
    let mut toggle = false;
    grow(&mut tree, root, fanout, depth, &mut toggle);
    (Rc::new(RefCell::new(tree)), root)
}

fn bench_regenerate(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter/regenerate");

    for (fanout, depth) in [(3, 4), (4, 5)] {
        let (tree, _root) = build_tree(fanout, depth);
        let nodes = tree.borrow().len();
        let view = TreeFilter::new(Rc::clone(&tree));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{nodes}nodes")),
            &(),
            |b, _| {
                b.iter(|| {
                    // Toggling the predicate forces two full regenerations.
                    view.borrow_mut().set_filter(Some(is_visible));
                    view.borrow_mut().set_filter(None);
                    black_box(view.borrow().len());
                });
            },
        );
    }
    group.finish();
}

fn bench_incremental_add_prune(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter/incremental");

    for (fanout, depth) in [(3, 4), (4, 5)] {
        let (tree, root) = build_tree(fanout, depth);
        let nodes = tree.borrow().len();
        let view = TreeFilter::new(Rc::clone(&tree));
        view.borrow_mut().set_filter(Some(is_visible));

        // A deep projected parent keeps the patch on the incremental path.
        let deep = {
            let guard = tree.borrow();
            let mut node = root;
            while let Some(&child) = guard.children(node).first() {
                node = child;
            }
            node
        };

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{nodes}nodes")),
            &(),
            |b, _| {
                b.iter(|| {
                    let added = tree
                        .borrow_mut()
                        .add_child(
                            deep,
                            DataNode::new().with_property("visible", Property::Bool(true)),
                        )
                        .unwrap();
                    tree.borrow_mut().prune(added).unwrap();
                    black_box(view.borrow().len());
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_regenerate, bench_incremental_add_prune);
criterion_main!(benches);
