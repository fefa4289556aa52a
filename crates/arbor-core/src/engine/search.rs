//! Best-first forest search.

use super::node::{NodeId, NodeView};
use super::{ForestIndex, Metric};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Wrapper for f32 to implement Ord for `BinaryHeap`.
///
/// Uses `f32::total_cmp`, keeping Ord/Eq consistent even with NaN.
#[derive(Debug, Clone, Copy)]
struct OrderedFloat(f32);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Collects candidates from all trees, then ranks them exactly.
///
/// `search_k <= 0` examines `n * n_trees` candidates.
pub(super) fn nearest<M: Metric>(
    index: &ForestIndex<M>,
    query: &[M::Element],
    n: usize,
    search_k: i32,
) -> Vec<(i32, M::Element)> {
    if n == 0 || index.roots.is_empty() {
        return Vec::new();
    }

    let budget = if search_k > 0 {
        search_k as usize
    } else {
        n.saturating_mul(index.roots.len())
    };

    let mut queue: BinaryHeap<(OrderedFloat, NodeId)> = index
        .roots
        .iter()
        .map(|&root| (OrderedFloat(M::pq_initial()), root))
        .collect();

    let mut candidates: Vec<i32> = Vec::with_capacity(budget.min(index.items.len()));
    while candidates.len() < budget {
        let Some((OrderedFloat(priority), node_id)) = queue.pop() else {
            break;
        };
        match index.node(node_id) {
            NodeView::Leaf { items } => candidates.extend(items.iter().map(|&id| id as i32)),
            NodeView::Split { children, split } => {
                let margin = M::stored_margin(split, query);
                queue.push((
                    OrderedFloat(M::pq_distance(priority, margin, 1)),
                    children[1],
                ));
                queue.push((
                    OrderedFloat(M::pq_distance(priority, margin, 0)),
                    children[0],
                ));
            }
        }
    }

    candidates.sort_unstable();
    candidates.dedup();

    let mut scored: Vec<(f32, i32)> = candidates
        .into_iter()
        .filter_map(|id| {
            let v = index.get_item(id)?;
            Some((M::distance(query, v), id))
        })
        .collect();

    // Ties resolve by id so results are stable.
    scored.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.truncate(n);

    scored
        .into_iter()
        .map(|(raw, id)| (id, M::normalized_distance(raw)))
        .collect()
}
