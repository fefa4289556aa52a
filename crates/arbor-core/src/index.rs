//! Metric-agnostic index contract.
//!
//! Every metric is driven through [`AnnIndex`] with `f32` vectors of the
//! external dimension, whatever the engine stores underneath. Float metrics
//! implement it directly on [`ForestIndex`]; Hamming goes through
//! [`HammingIndex`], which packs vectors into bit words.
//!
//! # Misuse
//!
//! Unknown ids and vectors of the wrong length never touch memory outside
//! the index: additions are rejected, queries come back empty, distances are
//! `NaN` and output buffers are left untouched.

use crate::engine::{Angular, Euclidean, ForestIndex, Manhattan, Metric};
use crate::error::{Error, Result};
use crate::hamming::HammingIndex;
use crate::metric::MetricKind;
use std::fmt::Debug;
use std::path::Path;

/// Result of a nearest-neighbor query, closest first.
///
/// `ids` and `distances` always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbors {
    /// Item ids.
    pub ids: Vec<i32>,
    /// Distance from the query to each item in `ids`.
    pub distances: Vec<f32>,
}

impl Neighbors {
    /// Number of neighbors found.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<(i32, f32)> for Neighbors {
    fn from_iter<T: IntoIterator<Item = (i32, f32)>>(iter: T) -> Self {
        let (ids, distances) = iter.into_iter().unzip();
        Self { ids, distances }
    }
}

/// Operations shared by every metric.
///
/// # Thread Safety
///
/// Queries take `&self` and may run concurrently once built. Mutations take
/// `&mut self`; nothing here locks.
pub trait AnnIndex: Send + Sync + Debug {
    /// Metric fixed at creation.
    fn metric(&self) -> MetricKind;

    /// External vector length, fixed at creation.
    fn dimension(&self) -> usize;

    /// Stores `vector` under `item`. Re-adding an id before a build is the
    /// caller's responsibility.
    ///
    /// # Errors
    ///
    /// Fails on a built or loaded index, a negative id, or a vector whose
    /// length differs from [`dimension`](Self::dimension).
    fn add_item(&mut self, item: i32, vector: &[f32]) -> Result<()>;

    /// Builds the search structure. `n_trees <= 0` adds trees until the
    /// node count reaches twice the number of added items; `n_threads <= 0`
    /// uses every available core.
    ///
    /// # Errors
    ///
    /// Fails if already built, or if an on-disk target cannot be written.
    fn build(&mut self, n_trees: i32, n_threads: i32) -> Result<()>;

    /// Drops the search structure and keeps the items.
    ///
    /// # Errors
    ///
    /// Fails on a loaded index.
    fn unbuild(&mut self) -> Result<()>;

    /// Persists the built index to `path` and reopens it from there.
    ///
    /// # Errors
    ///
    /// Fails on an unbuilt index or on I/O failure.
    fn save(&mut self, path: &Path, prefault: bool) -> Result<()>;

    /// Releases items and trees, keeping metric and dimension.
    fn unload(&mut self);

    /// Replaces the contents of this handle with the index at `path`.
    ///
    /// # Errors
    ///
    /// Fails on I/O failure or if the file was written for another metric or
    /// dimension.
    fn load(&mut self, path: &Path, prefault: bool) -> Result<()>;

    /// Stores items in a file at `path` from now on; the next
    /// [`build`](Self::build) completes that file and loads it.
    ///
    /// # Errors
    ///
    /// Fails on a built index or if `path` cannot be created.
    fn on_disk_build(&mut self, path: &Path) -> Result<()>;

    /// Distance between two stored items; `NaN` if either was never added.
    fn get_distance(&self, i: i32, j: i32) -> f32;

    /// Up to `n` nearest neighbors of a stored item. `search_k <= 0` uses the
    /// default effort of `n * n_trees` candidates.
    fn get_nns_by_item(&self, item: i32, n: usize, search_k: i32) -> Neighbors;

    /// Up to `n` nearest neighbors of `vector`.
    fn get_nns_by_vector(&self, vector: &[f32], n: usize, search_k: i32) -> Neighbors;

    /// Highest added id plus one.
    fn get_n_items(&self) -> i32;

    /// Number of trees; zero until built.
    fn get_n_trees(&self) -> i32;

    /// Toggles build progress logging at `info` level.
    fn verbose(&mut self, enabled: bool);

    /// Copies the stored vector for `item` into `out`.
    ///
    /// Returns false, leaving `out` untouched, if `item` is unknown or `out`
    /// has the wrong length.
    fn get_item(&self, item: i32, out: &mut [f32]) -> bool;

    /// Seeds the next build.
    fn set_seed(&mut self, seed: u64);
}

impl<M> AnnIndex for ForestIndex<M>
where
    M: Metric<Element = f32>,
{
    fn metric(&self) -> MetricKind {
        M::KIND
    }

    fn dimension(&self) -> usize {
        ForestIndex::dimension(self)
    }

    fn add_item(&mut self, item: i32, vector: &[f32]) -> Result<()> {
        ForestIndex::add_item(self, item, vector)
    }

    fn build(&mut self, n_trees: i32, n_threads: i32) -> Result<()> {
        ForestIndex::build(self, n_trees, n_threads)
    }

    fn unbuild(&mut self) -> Result<()> {
        ForestIndex::unbuild(self)
    }

    fn save(&mut self, path: &Path, prefault: bool) -> Result<()> {
        ForestIndex::save(self, path, prefault)
    }

    fn unload(&mut self) {
        ForestIndex::unload(self);
    }

    fn load(&mut self, path: &Path, prefault: bool) -> Result<()> {
        ForestIndex::load(self, path, prefault)
    }

    fn on_disk_build(&mut self, path: &Path) -> Result<()> {
        ForestIndex::on_disk_build(self, path)
    }

    fn get_distance(&self, i: i32, j: i32) -> f32 {
        ForestIndex::get_distance(self, i, j).unwrap_or(f32::NAN)
    }

    fn get_nns_by_item(&self, item: i32, n: usize, search_k: i32) -> Neighbors {
        ForestIndex::get_nns_by_item(self, item, n, search_k)
            .into_iter()
            .collect()
    }

    fn get_nns_by_vector(&self, vector: &[f32], n: usize, search_k: i32) -> Neighbors {
        ForestIndex::get_nns_by_vector(self, vector, n, search_k)
            .into_iter()
            .collect()
    }

    fn get_n_items(&self) -> i32 {
        ForestIndex::get_n_items(self)
    }

    fn get_n_trees(&self) -> i32 {
        ForestIndex::get_n_trees(self)
    }

    fn verbose(&mut self, enabled: bool) {
        ForestIndex::verbose(self, enabled);
    }

    fn get_item(&self, item: i32, out: &mut [f32]) -> bool {
        match ForestIndex::get_item(self, item) {
            Some(v) if v.len() == out.len() => {
                out.copy_from_slice(v);
                true
            }
            _ => false,
        }
    }

    fn set_seed(&mut self, seed: u64) {
        ForestIndex::set_seed(self, seed);
    }
}

/// Creates an empty index for `metric` with external dimension `f`.
///
/// # Errors
///
/// Returns [`Error::InvalidDimension`] when `f` is zero.
pub fn create_index(metric: MetricKind, f: usize) -> Result<Box<dyn AnnIndex>> {
    if f == 0 {
        return Err(Error::InvalidDimension(f));
    }
    let index: Box<dyn AnnIndex> = match metric {
        MetricKind::Angular => Box::new(ForestIndex::<Angular>::new(f)),
        MetricKind::Euclidean => Box::new(ForestIndex::<Euclidean>::new(f)),
        MetricKind::Manhattan => Box::new(ForestIndex::<Manhattan>::new(f)),
        MetricKind::Hamming => Box::new(HammingIndex::new(f)),
    };
    tracing::debug!(%metric, dimension = f, "index created");
    Ok(index)
}
