//! Tree node layout.
//!
//! Trees are built as [`Node`] values, then flattened into an arena of
//! fixed-stride `u32` records shared by every tree:
//!
//! ```text
//! split: [SPLIT_TAG, child 0, child 1, split words...]
//! leaf:  [count, id, id, ...]
//! ```
//!
//! The stride fits both the widest split and a full leaf bucket, so a node
//! id is just a record index, in memory and in a mapped file alike.

/// Index of a node in the forest's node arena.
pub type NodeId = u32;

/// First word of a split record. Leaf counts never reach it.
pub(super) const SPLIT_TAG: u32 = u32::MAX;

/// A node of one tree under construction.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Node<S> {
    /// Internal node: a split and its two children (`[side 0, side 1]`).
    Split { split: S, children: [NodeId; 2] },
    /// Bucket of item ids.
    Leaf { items: Vec<i32> },
}

/// Borrowed view of one arena record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum NodeView<'a> {
    Split {
        children: [NodeId; 2],
        /// Encoded split, as written by `Metric::encode_split`.
        split: &'a [u32],
    },
    Leaf {
        items: &'a [u32],
    },
}

impl<'a> NodeView<'a> {
    /// Decodes a record of the arena.
    pub(super) fn decode(record: &'a [u32], split_words: usize) -> Self {
        match record.first() {
            Some(&SPLIT_TAG) if record.len() >= 3 => NodeView::Split {
                children: [record[1], record[2]],
                split: record.get(3..3 + split_words).unwrap_or_default(),
            },
            Some(&count) => NodeView::Leaf {
                items: record.get(1..1 + count as usize).unwrap_or_default(),
            },
            None => NodeView::Leaf { items: &[] },
        }
    }
}

/// Oriented hyperplane used by the float metrics.
///
/// An item falls on side 1 when `offset + normal · v > 0`. Stored as
/// `[offset, normal...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperplane {
    /// Unit normal of the plane.
    pub normal: Vec<f32>,
    /// Signed offset; always zero for angular splits.
    pub offset: f32,
}

/// Single-bit split used by the Hamming metric. Stored as `[bit]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSplit {
    /// Bit position across the packed words.
    pub bit: u32,
}
