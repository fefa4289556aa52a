//! Opaque index handle passed to C callers.

use arbor_core::{create_index, AnnIndex, ArborConfig, MetricKind, Neighbors, Result};
use std::path::Path;

/// One index plus the defaults read from configuration when it was created.
///
/// C callers only ever see `*mut ArborIndex`. Each handle owns everything it
/// uses; there is no process-wide registry.
#[derive(Debug)]
pub struct ArborIndex {
    index: Box<dyn AnnIndex>,
    config: ArborConfig,
}

impl ArborIndex {
    /// Creates an empty handle, reading configuration once.
    pub(crate) fn new(metric: MetricKind, f: usize) -> Result<Self> {
        Ok(Self {
            index: create_index(metric, f)?,
            config: load_config(),
        })
    }

    pub(crate) fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub(crate) fn add_item(&mut self, item: i32, vector: &[f32]) -> Result<()> {
        self.index.add_item(item, vector)
    }

    /// Builds with explicit or configured parameters. `n_trees <= 0` falls
    /// back to the configured tree count; `n_threads` of `None` uses the
    /// configured thread count.
    pub(crate) fn build(&mut self, n_trees: i32, n_threads: Option<i32>) -> Result<()> {
        let n_trees = if n_trees > 0 {
            n_trees
        } else {
            self.config.build.n_trees
        };
        let n_threads = n_threads.unwrap_or(self.config.build.n_threads);
        self.index.build(n_trees, n_threads)
    }

    pub(crate) fn unbuild(&mut self) -> Result<()> {
        self.index.unbuild()
    }

    pub(crate) fn save(&mut self, path: &Path, prefault: bool) -> Result<()> {
        self.index.save(path, prefault)
    }

    pub(crate) fn unload(&mut self) {
        self.index.unload();
    }

    pub(crate) fn load(&mut self, path: &Path, prefault: bool) -> Result<()> {
        self.index.load(path, prefault)
    }

    pub(crate) fn on_disk_build(&mut self, path: &Path) -> Result<()> {
        self.index.on_disk_build(path)
    }

    pub(crate) fn get_distance(&self, i: i32, j: i32) -> f32 {
        self.index.get_distance(i, j)
    }

    pub(crate) fn get_nns_by_item(&self, item: i32, n: usize, search_k: i32) -> Neighbors {
        let search_k = self.config.effective_search_k(search_k);
        self.index.get_nns_by_item(item, n, search_k)
    }

    pub(crate) fn get_nns_by_vector(&self, vector: &[f32], n: usize, search_k: i32) -> Neighbors {
        let search_k = self.config.effective_search_k(search_k);
        self.index.get_nns_by_vector(vector, n, search_k)
    }

    pub(crate) fn get_n_items(&self) -> i32 {
        self.index.get_n_items()
    }

    pub(crate) fn get_n_trees(&self) -> i32 {
        self.index.get_n_trees()
    }

    pub(crate) fn verbose(&mut self, enabled: bool) {
        self.index.verbose(enabled);
    }

    pub(crate) fn get_item(&self, item: i32, out: &mut [f32]) -> bool {
        self.index.get_item(item, out)
    }

    pub(crate) fn set_seed(&mut self, seed: u64) {
        self.index.set_seed(seed);
    }
}

/// Reads `arbor.toml` and `ARBOR_*`, falling back to defaults on any error.
pub(crate) fn load_config() -> ArborConfig {
    match ArborConfig::load().and_then(|config| config.validate().map(|()| config)) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring invalid configuration, using defaults");
            ArborConfig::default()
        }
    }
}
