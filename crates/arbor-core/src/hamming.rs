//! Bit-packing adapter for the Hamming metric.
//!
//! Callers hand over `f32` vectors of length `f`; the engine stores
//! `ceil(f / 64)` packed words. Each value becomes one bit, set when the value
//! is strictly greater than 0.5.
//!
//! # Lossy Round Trip
//!
//! [`unpack`] only ever yields `0.0` or `1.0`. An input of `0.7` comes back as
//! `1.0` and `0.2` as `0.0`: the thresholded value is all the index keeps.
//! This is the intended data shape for Hamming search, not a defect.

use crate::engine::{ForestIndex, Hamming};
use crate::error::{Error, Result};
use crate::index::{AnnIndex, Neighbors};
use crate::metric::{MetricKind, BITS_PER_WORD};
use std::path::Path;

/// Values strictly above this become set bits.
pub const THRESHOLD: f32 = 0.5;

/// Number of packed words needed for `f` values.
#[must_use]
pub const fn packed_len(f: usize) -> usize {
    f.div_ceil(BITS_PER_WORD)
}

/// Packs `src` into `dst`, one bit per value, low bits first.
///
/// Every word of `dst` is overwritten; bits past `src.len()` are zero. Values
/// beyond `dst.len() * 64` are ignored.
pub fn pack(src: &[f32], dst: &mut [u64]) {
    let mut chunks = src.chunks(BITS_PER_WORD);
    for word in dst.iter_mut() {
        *word = chunks.next().map_or(0, |chunk| {
            chunk
                .iter()
                .enumerate()
                .filter(|(_, x)| **x > THRESHOLD)
                .fold(0u64, |acc, (bit, _)| acc | (1u64 << bit))
        });
    }
}

/// Expands packed bits into `dst` as `0.0` / `1.0`.
///
/// Positions with no backing word in `src` read as `0.0`.
pub fn unpack(src: &[u64], dst: &mut [f32]) {
    for (i, out) in dst.iter_mut().enumerate() {
        let word = src.get(i / BITS_PER_WORD).copied().unwrap_or(0);
        *out = if (word >> (i % BITS_PER_WORD)) & 1 == 1 {
            1.0
        } else {
            0.0
        };
    }
}

/// Hamming index over float vectors, backed by a packed-word forest.
#[derive(Debug)]
pub struct HammingIndex {
    /// Length of caller vectors.
    dimension: usize,
    inner: ForestIndex<Hamming>,
}

impl HammingIndex {
    /// Creates an empty index for vectors of `dimension` values.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: ForestIndex::with_external_dimension(packed_len(dimension), dimension),
        }
    }

    /// Packs a caller vector, checking its length.
    fn pack_vector(&self, vector: &[f32]) -> Result<Vec<u64>> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let mut words = vec![0u64; self.inner.dimension()];
        pack(vector, &mut words);
        Ok(words)
    }

    fn widen(result: Vec<(i32, u64)>) -> Neighbors {
        result
            .into_iter()
            .map(|(id, bits)| (id, bits as f32))
            .collect()
    }
}

impl AnnIndex for HammingIndex {
    fn metric(&self) -> MetricKind {
        MetricKind::Hamming
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn add_item(&mut self, item: i32, vector: &[f32]) -> Result<()> {
        let words = self.pack_vector(vector)?;
        self.inner.add_item(item, &words)
    }

    fn build(&mut self, n_trees: i32, n_threads: i32) -> Result<()> {
        self.inner.build(n_trees, n_threads)
    }

    fn unbuild(&mut self) -> Result<()> {
        self.inner.unbuild()
    }

    fn save(&mut self, path: &Path, prefault: bool) -> Result<()> {
        self.inner.save(path, prefault)
    }

    fn unload(&mut self) {
        self.inner.unload();
    }

    fn load(&mut self, path: &Path, prefault: bool) -> Result<()> {
        self.inner.load(path, prefault)
    }

    fn on_disk_build(&mut self, path: &Path) -> Result<()> {
        self.inner.on_disk_build(path)
    }

    fn get_distance(&self, i: i32, j: i32) -> f32 {
        self.inner.get_distance(i, j).map_or(f32::NAN, |bits| bits as f32)
    }

    fn get_nns_by_item(&self, item: i32, n: usize, search_k: i32) -> Neighbors {
        Self::widen(self.inner.get_nns_by_item(item, n, search_k))
    }

    fn get_nns_by_vector(&self, vector: &[f32], n: usize, search_k: i32) -> Neighbors {
        match self.pack_vector(vector) {
            Ok(words) => Self::widen(self.inner.get_nns_by_vector(&words, n, search_k)),
            Err(err) => {
                tracing::warn!(error = %err, "hamming query rejected");
                Neighbors::default()
            }
        }
    }

    fn get_n_items(&self) -> i32 {
        self.inner.get_n_items()
    }

    fn get_n_trees(&self) -> i32 {
        self.inner.get_n_trees()
    }

    fn verbose(&mut self, enabled: bool) {
        self.inner.verbose(enabled);
    }

    fn get_item(&self, item: i32, out: &mut [f32]) -> bool {
        if out.len() != self.dimension {
            return false;
        }
        match self.inner.get_item(item) {
            Some(words) => {
                unpack(words, out);
                true
            }
            None => false,
        }
    }

    fn set_seed(&mut self, seed: u64) {
        self.inner.set_seed(seed);
    }
}
