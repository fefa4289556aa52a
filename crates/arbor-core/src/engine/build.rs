//! Tree construction.
//!
//! Each tree is built from its own seed, drawn from the forest generator
//! before any work starts. Trees are then independent and can be built on
//! any number of threads without changing the result. Finished trees are
//! flattened into the node arena in tree order.

use super::node::{Node, NodeId, SPLIT_TAG};
use super::random::XorShiftRng;
use super::{progress, ForestIndex, Metric};
use crate::error::{Error, Result};
use rayon::prelude::*;
use std::marker::PhantomData;

/// Splits leaving more than this share of points on one side are retried.
const MAX_IMBALANCE: f64 = 0.95;

/// Split attempts before assigning sides at random.
const SPLIT_ATTEMPTS: usize = 3;

/// One tree, with node ids local to `nodes`.
struct Tree<S> {
    nodes: Vec<Node<S>>,
    root: NodeId,
}

/// Flattened forest: node arena words and one root per tree.
pub(super) type Arena = (Vec<u32>, Vec<NodeId>);

/// Builds the forest over the present items of `index`.
pub(super) fn build_forest<M: Metric>(
    index: &ForestIndex<M>,
    n_trees: i32,
    n_threads: i32,
) -> Result<Arena> {
    let ids = index.items.present_ids();
    let mut rng = XorShiftRng::new(index.seed);
    let mut arena = ArenaWriter::<M>::new(index);

    if n_trees > 0 {
        let seeds: Vec<u64> = (0..n_trees).map(|_| rng.next_u64()).collect();
        let trees = build_trees(index, &ids, &seeds, n_threads)?;
        for (i, tree) in trees.into_iter().enumerate() {
            arena.append(tree);
            progress!(index.verbose, tree = i, n_nodes = arena.n_nodes(), "pass done");
        }
        return Ok(arena.finish());
    }

    // Auto mode: one tree at a time, so the tree count does not depend on
    // the thread count. Only present items count towards the target.
    let mut pass = 0usize;
    while arena.n_nodes() < 2 * ids.len() {
        let seed = rng.next_u64();
        arena.append(make_tree(index, &ids, seed));
        progress!(index.verbose, tree = pass, n_nodes = arena.n_nodes(), "pass done");
        pass += 1;
    }
    Ok(arena.finish())
}

fn build_trees<M: Metric>(
    index: &ForestIndex<M>,
    ids: &[i32],
    seeds: &[u64],
    n_threads: i32,
) -> Result<Vec<Tree<M::Split>>> {
    match n_threads {
        1 => Ok(seeds.iter().map(|&s| make_tree(index, ids, s)).collect()),
        n if n <= 0 => Ok(seeds.par_iter().map(|&s| make_tree(index, ids, s)).collect()),
        n => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n as usize)
                .build()
                .map_err(|e| Error::Build(format!("failed to start {n} build threads: {e}")))?;
            Ok(pool.install(|| seeds.par_iter().map(|&s| make_tree(index, ids, s)).collect()))
        }
    }
}

/// Encodes trees into fixed-stride arena records.
struct ArenaWriter<M: Metric> {
    stride: usize,
    split_words: usize,
    words: Vec<u32>,
    roots: Vec<NodeId>,
    _metric: PhantomData<M>,
}

impl<M: Metric> ArenaWriter<M> {
    fn new(index: &ForestIndex<M>) -> Self {
        Self {
            stride: index.node_stride,
            split_words: M::split_words(index.dimension),
            words: Vec::new(),
            roots: Vec::new(),
            _metric: PhantomData,
        }
    }

    fn n_nodes(&self) -> usize {
        self.words.len() / self.stride
    }

    /// Appends a tree, shifting its local node ids past the existing ones.
    fn append(&mut self, tree: Tree<M::Split>) {
        let base = self.n_nodes() as NodeId;
        self.roots.push(base + tree.root);
        for node in tree.nodes {
            let start = self.words.len();
            self.words.resize(start + self.stride, 0);
            let record = &mut self.words[start..];
            match node {
                Node::Split { split, children } => {
                    record[0] = SPLIT_TAG;
                    record[1] = children[0] + base;
                    record[2] = children[1] + base;
                    M::encode_split(&split, &mut record[3..3 + self.split_words]);
                }
                Node::Leaf { items } => {
                    record[0] = items.len() as u32;
                    for (word, id) in record[1..].iter_mut().zip(items) {
                        *word = id as u32;
                    }
                }
            }
        }
    }

    fn finish(self) -> Arena {
        (self.words, self.roots)
    }
}

fn make_tree<M: Metric>(index: &ForestIndex<M>, ids: &[i32], seed: u64) -> Tree<M::Split> {
    let mut rng = XorShiftRng::new(seed);
    let mut nodes = Vec::new();
    let root = make_subtree(index, ids.to_vec(), &mut rng, &mut nodes);
    Tree { nodes, root }
}

fn make_subtree<M: Metric>(
    index: &ForestIndex<M>,
    ids: Vec<i32>,
    rng: &mut XorShiftRng,
    nodes: &mut Vec<Node<M::Split>>,
) -> NodeId {
    if ids.len() <= index.leaf_size {
        nodes.push(Node::Leaf { items: ids });
        return (nodes.len() - 1) as NodeId;
    }

    let vectors: Vec<&[M::Element]> = ids.iter().map(|&id| item(index, id)).collect();

    let mut split = M::create_split(&vectors, rng);
    let mut sides = assign_sides::<M>(&split, &vectors, rng);
    for _ in 1..SPLIT_ATTEMPTS {
        if imbalance(&sides) <= MAX_IMBALANCE {
            break;
        }
        split = M::create_split(&vectors, rng);
        sides = assign_sides::<M>(&split, &vectors, rng);
    }
    if imbalance(&sides) > MAX_IMBALANCE {
        sides = random_sides(ids.len(), rng);
    }

    let mut children_ids: [Vec<i32>; 2] = [Vec::new(), Vec::new()];
    for (&id, &side) in ids.iter().zip(&sides) {
        children_ids[side].push(id);
    }

    // Reserve the slot so the split precedes its children.
    let slot = nodes.len();
    nodes.push(Node::Leaf { items: Vec::new() });
    let [left, right] = children_ids;
    let left = make_subtree(index, left, rng, nodes);
    let right = make_subtree(index, right, rng, nodes);
    nodes[slot] = Node::Split {
        split,
        children: [left, right],
    };
    slot as NodeId
}

fn item<M: Metric>(index: &ForestIndex<M>, id: i32) -> &[M::Element] {
    index.items.get(id as usize).unwrap_or_default()
}

fn assign_sides<M: Metric>(
    split: &M::Split,
    vectors: &[&[M::Element]],
    rng: &mut XorShiftRng,
) -> Vec<usize> {
    vectors.iter().map(|v| M::side(split, v, rng)).collect()
}

/// Random assignment that never leaves a side empty.
pub(super) fn random_sides(n: usize, rng: &mut XorShiftRng) -> Vec<usize> {
    let mut sides: Vec<usize> = (0..n).map(|_| rng.flip()).collect();
    if imbalance(&sides) >= 1.0 {
        for (i, side) in sides.iter_mut().enumerate() {
            *side = i % 2;
        }
    }
    sides
}

/// Share of points on the larger side.
pub(super) fn imbalance(sides: &[usize]) -> f64 {
    let right = sides.iter().filter(|&&s| s == 1).count();
    let left = sides.len() - right;
    left.max(right) as f64 / sides.len().max(1) as f64
}
