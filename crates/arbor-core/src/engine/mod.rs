//! Random-projection forest engine.
//!
//! [`ForestIndex`] stores items of one element type and answers approximate
//! nearest-neighbor queries by walking a forest of binary space-partitioning
//! trees. The behavior specific to a distance lives in a [`Metric`].
//!
//! # Lifecycle
//!
//! ```text
//!            add_item
//!              ┌──┐
//!              ▼  │       build / on-disk build
//!   ┌──────► Unbuilt ──────────────────────────► Built
//!   │            ▲  ◄──────────── unbuild ────────  │
//!   │ unload     │                                  │ save
//!   │            │ unload         load              ▼
//!   └─────────── Loaded ◄─────────────────────── (any)
//! ```

mod build;
mod metrics;
mod node;
mod persistence;
mod random;
mod search;
mod store;

#[cfg(test)]
mod build_tests;
#[cfg(test)]
mod metrics_tests;
#[cfg(test)]
mod random_tests;

pub use metrics::{Angular, Euclidean, Hamming, Manhattan, Metric};
pub use node::{BitSplit, Hyperplane, NodeId};
pub use random::XorShiftRng;

use crate::error::{Error, Result};
use node::NodeView;
use std::fs::OpenOptions;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::{FileRegion, ItemTable, Section};

/// Smallest bucket size, whatever the dimension.
const MIN_LEAF_SIZE: usize = 8;

/// Emits a build progress event: `info` when verbose, `debug` otherwise.
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}
pub(crate) use progress;

/// Build state of a forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Accepts items; no search structure.
    Unbuilt,
    /// Trees built in memory; accepts queries.
    Built,
    /// Restored from a file; accepts queries, cannot be unbuilt.
    Loaded,
}

/// Random-projection forest over items of `M::Element`.
///
/// # Storage
///
/// Items and nodes live on the heap while building. A loaded index is
/// searched in place through a read-only mapping of its file, and an
/// on-disk build writes items straight into a growing file mapping.
///
/// # Thread Safety
///
/// Queries take `&self` and may run concurrently. Mutations take `&mut self`;
/// a caller sharing a handle across threads must provide its own exclusion.
#[derive(Debug)]
pub struct ForestIndex<M: Metric> {
    /// Number of stored elements per item.
    dimension: usize,
    /// Values per caller vector, recorded in saved files.
    external_dimension: usize,
    /// Maximum ids per leaf bucket.
    leaf_size: usize,
    /// Words per node record.
    node_stride: usize,
    /// Item vectors, addressed by id.
    items: ItemTable<M::Element>,
    /// Node arena shared by all trees.
    nodes: Section<u32>,
    /// Root node of each tree.
    roots: Vec<NodeId>,
    state: BuildState,
    seed: u64,
    verbose: bool,
    /// File receiving the items and the next build, set by `on_disk_build`.
    on_disk_path: Option<PathBuf>,
    _metric: PhantomData<M>,
}

impl<M: Metric> ForestIndex<M> {
    /// Creates an empty forest storing `dimension` elements per item.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self::with_external_dimension(dimension, dimension)
    }

    /// Creates an empty forest storing `dimension` elements per item for
    /// caller vectors of `external_dimension` values.
    ///
    /// Both are written to saved files and checked on load, so an adapter
    /// that packs several values into one element still rejects a file
    /// built for another caller dimension.
    #[must_use]
    pub fn with_external_dimension(dimension: usize, external_dimension: usize) -> Self {
        let leaf_size = (dimension + 2).max(MIN_LEAF_SIZE);
        Self {
            dimension,
            external_dimension,
            leaf_size,
            node_stride: (leaf_size + 1).max(3 + M::split_words(dimension)),
            items: ItemTable::new(dimension),
            nodes: Section::default(),
            roots: Vec::new(),
            state: BuildState::Unbuilt,
            seed: XorShiftRng::DEFAULT_SEED,
            verbose: false,
            on_disk_path: None,
            _metric: PhantomData,
        }
    }

    /// Number of stored elements per item.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Current build state.
    #[must_use]
    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Stores `vector` under `item`.
    ///
    /// Ids index directly into storage, so sparse ids leave gaps. Re-adding an
    /// id before building replaces the previous vector; callers should not
    /// rely on it.
    ///
    /// # Errors
    ///
    /// Fails on a built or loaded index, a negative id, a vector of the
    /// wrong length, or when an on-disk file cannot grow.
    pub fn add_item(&mut self, item: i32, vector: &[M::Element]) -> Result<()> {
        if self.state != BuildState::Unbuilt {
            return Err(Error::InvalidState(
                "You can't add an item to a built index".to_string(),
            ));
        }
        let slot = usize::try_from(item).map_err(|_| Error::InvalidItem(item))?;
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        self.items.put(slot, vector)
    }

    /// Builds `n_trees` trees, or as many as needed for the node count to
    /// reach twice the number of added items when `n_trees <= 0`. Gaps left
    /// by sparse ids do not count.
    ///
    /// After an [`on_disk_build`](Self::on_disk_build) the forest is written
    /// to that file and the handle ends up loaded from it.
    ///
    /// `n_threads == 1` builds on the calling thread; larger values use a
    /// dedicated pool of that size; `<= 0` uses the global rayon pool. The
    /// result only depends on the seed, not on the thread count.
    ///
    /// # Errors
    ///
    /// Fails if already built or loaded, if a worker pool cannot be created,
    /// or if an on-disk target cannot be written.
    pub fn build(&mut self, n_trees: i32, n_threads: i32) -> Result<()> {
        if self.state != BuildState::Unbuilt {
            return Err(Error::InvalidState(
                "You can't build a built index".to_string(),
            ));
        }

        let (nodes, roots) = build::build_forest(self, n_trees, n_threads)?;
        self.nodes = Section::Heap(nodes);
        self.roots = roots;
        self.state = BuildState::Built;

        progress!(
            self.verbose,
            n_items = self.get_n_items(),
            n_trees = self.roots.len(),
            n_nodes = self.n_nodes(),
            "forest built"
        );

        if let Some(path) = self.on_disk_path.clone() {
            if let Err(err) = self.finish_on_disk(&path) {
                self.reset_trees();
                return Err(err);
            }
            progress!(self.verbose, path = %path.display(), "forest written to disk");
        }
        Ok(())
    }

    /// Drops all trees and returns to the unbuilt state, keeping items.
    ///
    /// # Errors
    ///
    /// Fails on a loaded index.
    pub fn unbuild(&mut self) -> Result<()> {
        if self.state == BuildState::Loaded {
            return Err(Error::InvalidState(
                "You can't unbuild a loaded index".to_string(),
            ));
        }
        self.reset_trees();
        Ok(())
    }

    /// Writes the built forest to `path`, then reloads it from that file.
    ///
    /// The handle is in the loaded state afterwards.
    ///
    /// # Errors
    ///
    /// Fails on an unbuilt index or on any I/O error.
    pub fn save(&mut self, path: &Path, prefault: bool) -> Result<()> {
        if self.state == BuildState::Unbuilt {
            return Err(Error::InvalidState(
                "You can't save an index that hasn't been built".to_string(),
            ));
        }
        persistence::write_file(self, path)?;
        progress!(self.verbose, path = %path.display(), "forest saved");
        self.load(path, prefault)
    }

    /// Releases items and trees, unmapping any file. The handle stays usable
    /// as an empty, unbuilt forest of the same dimension.
    pub fn unload(&mut self) {
        self.items.clear();
        self.nodes = Section::default();
        self.roots = Vec::new();
        self.state = BuildState::Unbuilt;
        self.on_disk_path = None;
        progress!(self.verbose, "forest unloaded");
    }

    /// Replaces the contents of this handle with the forest stored at `path`.
    ///
    /// The file stays mapped and is searched in place until the handle is
    /// unloaded or reloaded. With `prefault`, the whole file is paged in up
    /// front.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, is not an index, or was written for
    /// another metric or dimension. The handle is left unchanged on error.
    pub fn load(&mut self, path: &Path, prefault: bool) -> Result<()> {
        let mapped = persistence::read_file(self, path, prefault)?;
        self.items.set_section(Section::Mapped {
            map: Arc::clone(&mapped.map),
            range: mapped.layout.items,
        });
        self.nodes = Section::Mapped {
            map: mapped.map,
            range: mapped.layout.nodes,
        };
        self.roots = mapped.roots;
        self.state = BuildState::Loaded;
        self.on_disk_path = None;
        progress!(
            self.verbose,
            path = %path.display(),
            n_items = self.get_n_items(),
            n_trees = self.roots.len(),
            "forest loaded"
        );
        Ok(())
    }

    /// Moves item storage into a file at `path`, which the next
    /// [`build`](Self::build) completes with the trees.
    ///
    /// The file is created (or truncated) and mapped immediately; items
    /// already added are copied in and later ones are written straight to
    /// the mapping, which grows with the item count.
    ///
    /// # Errors
    ///
    /// Fails on a built or loaded index, or if the file cannot be created.
    pub fn on_disk_build(&mut self, path: &Path) -> Result<()> {
        if self.state != BuildState::Unbuilt {
            return Err(Error::InvalidState(
                "You can't prepare an on-disk build for a built index".to_string(),
            ));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut section = Section::File(FileRegion::create(file, persistence::HEADER_LEN)?);

        let existing = self.items.words();
        section.grow_to(existing.len())?[..existing.len()].copy_from_slice(existing);
        self.items.set_section(section);

        self.on_disk_path = Some(path.to_path_buf());
        progress!(self.verbose, path = %path.display(), "items stored on disk");
        Ok(())
    }

    /// Distance between two stored items, or `None` if either is missing.
    #[must_use]
    pub fn get_distance(&self, i: i32, j: i32) -> Option<M::Element> {
        let a = self.get_item(i)?;
        let b = self.get_item(j)?;
        Some(M::normalized_distance(M::distance(a, b)))
    }

    /// Up to `n` nearest neighbors of a stored item, closest first.
    ///
    /// Returns nothing if `item` was never added.
    #[must_use]
    pub fn get_nns_by_item(&self, item: i32, n: usize, search_k: i32) -> Vec<(i32, M::Element)> {
        match self.get_item(item) {
            Some(v) => search::nearest(self, v, n, search_k),
            None => Vec::new(),
        }
    }

    /// Up to `n` nearest neighbors of `vector`, closest first.
    ///
    /// Returns nothing if `vector` has the wrong length.
    #[must_use]
    pub fn get_nns_by_vector(
        &self,
        vector: &[M::Element],
        n: usize,
        search_k: i32,
    ) -> Vec<(i32, M::Element)> {
        if vector.len() != self.dimension {
            tracing::warn!(
                expected = self.dimension,
                actual = vector.len(),
                "query vector has wrong dimension"
            );
            return Vec::new();
        }
        search::nearest(self, vector, n, search_k)
    }

    /// Highest added id plus one.
    #[must_use]
    pub fn get_n_items(&self) -> i32 {
        self.items.len() as i32
    }

    /// Number of trees in the forest.
    #[must_use]
    pub fn get_n_trees(&self) -> i32 {
        self.roots.len() as i32
    }

    /// Promotes build progress events to `info` level.
    pub fn verbose(&mut self, enabled: bool) {
        self.verbose = enabled;
    }

    /// Stored vector for `item`.
    #[must_use]
    pub fn get_item(&self, item: i32) -> Option<&[M::Element]> {
        let slot = usize::try_from(item).ok()?;
        self.items.get(slot)
    }

    /// Seeds split selection for subsequent builds.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Appends the trees to the on-disk file and maps the result.
    fn finish_on_disk(&mut self, path: &Path) -> Result<()> {
        let len = persistence::finish_on_disk(self)?;
        self.items.section_mut().set_file_len(len)?;
        self.load(path, false)
    }

    fn reset_trees(&mut self) {
        self.nodes = Section::default();
        self.roots.clear();
        self.state = BuildState::Unbuilt;
    }

    /// Number of records in the node arena.
    fn n_nodes(&self) -> usize {
        self.nodes.len() / self.node_stride
    }

    fn node(&self, id: NodeId) -> NodeView<'_> {
        let start = id as usize * self.node_stride;
        let record = self
            .nodes
            .words()
            .get(start..start + self.node_stride)
            .unwrap_or_default();
        NodeView::decode(record, M::split_words(self.dimension))
    }
}
