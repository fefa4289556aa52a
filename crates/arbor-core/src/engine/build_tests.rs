//! Tests for `build` module

use super::build::{imbalance, random_sides};
use super::random::XorShiftRng;
use super::node::NodeView;
use super::{Euclidean, ForestIndex, Hamming};

fn grid_index(n: i32) -> ForestIndex<Euclidean> {
    let mut index = ForestIndex::<Euclidean>::new(2);
    for i in 0..n {
        index
            .add_item(i, &[(i % 10) as f32, (i / 10) as f32])
            .unwrap();
    }
    index
}

#[test]
fn test_imbalance() {
    assert!((imbalance(&[0, 1, 0, 1]) - 0.5).abs() < 1e-9);
    assert!((imbalance(&[1, 1, 1, 0]) - 0.75).abs() < 1e-9);
    assert!((imbalance(&[0, 0, 0]) - 1.0).abs() < 1e-9);
}

#[test]
fn test_random_sides_never_empty() {
    for seed in 1..200 {
        let sides = random_sides(2, &mut XorShiftRng::new(seed));
        assert!(imbalance(&sides) < 1.0, "seed {seed} left a side empty");
    }
}

#[test]
fn test_every_item_lands_in_exactly_one_leaf_per_tree() {
    let mut index = grid_index(100);
    index.build(3, 1).unwrap();

    for &root in &index.roots {
        let mut seen = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match index.node(id) {
                NodeView::Leaf { items } => seen.extend(items.iter().map(|&i| i as i32)),
                NodeView::Split { children, .. } => stack.extend_from_slice(&children),
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}

#[test]
fn test_leaves_respect_leaf_size() {
    let mut index = grid_index(200);
    index.build(2, 1).unwrap();

    for id in 0..index.n_nodes() {
        if let NodeView::Leaf { items } = index.node(id as u32) {
            assert!(items.len() <= index.leaf_size);
        }
    }
}

#[test]
fn test_auto_tree_count_covers_twice_the_items() {
    let mut index = grid_index(50);
    index.build(-1, 1).unwrap();

    assert!(index.get_n_trees() >= 1);
    assert!(index.n_nodes() >= 100);
}

#[test]
fn test_auto_tree_count_ignores_id_gaps() {
    let mut index = ForestIndex::<Euclidean>::new(2);
    index.add_item(1_000, &[1.0, 2.0]).unwrap();

    index.build(-1, 1).unwrap();

    assert_eq!(index.get_n_items(), 1_001);
    assert_eq!(index.get_n_trees(), 2);
    assert_eq!(index.n_nodes(), 2);
}

#[test]
fn test_node_records_share_one_stride() {
    let mut index = grid_index(60);
    index.build(2, 1).unwrap();

    assert_eq!(index.nodes.len(), index.n_nodes() * index.node_stride);
    assert!(index.node_stride > index.leaf_size);
}

#[test]
fn test_thread_count_does_not_change_forest() {
    let mut sequential = grid_index(120);
    sequential.set_seed(1234);
    sequential.build(4, 1).unwrap();

    let mut parallel = grid_index(120);
    parallel.set_seed(1234);
    parallel.build(4, 3).unwrap();

    assert_eq!(sequential.roots, parallel.roots);
    assert_eq!(sequential.nodes.words(), parallel.nodes.words());
}

#[test]
fn test_duplicate_points_still_build() {
    let mut index = ForestIndex::<Hamming>::new(1);
    for i in 0..64 {
        index.add_item(i, &[0xFF]).unwrap();
    }

    index.build(2, 1).unwrap();

    assert_eq!(index.get_n_trees(), 2);
    assert_eq!(index.get_nns_by_item(0, 64, -1).len(), 64);
}

#[test]
fn test_sparse_ids_are_skipped() {
    let mut index = ForestIndex::<Euclidean>::new(1);
    index.add_item(3, &[1.0]).unwrap();
    index.add_item(10, &[2.0]).unwrap();

    index.build(1, 1).unwrap();

    let ids: Vec<i32> = index
        .get_nns_by_vector(&[0.0], 10, -1)
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec![3, 10]);
}
