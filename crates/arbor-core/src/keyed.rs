//! Keyed index: caller keys on top of dense item ids.
//!
//! [`KeyedIndex`] assigns ids `0..n` in input order, builds once, and maps
//! query results back to keys. A saved index is a directory:
//!
//! ```text
//! <dir>/
//! ├── ids             one encoded key per line, in id order
//! ├── manifest.json   dimension and metric
//! └── index           forest file
//! ```

use crate::error::{Error, Result};
use crate::index::{create_index, AnnIndex};
use crate::metric::MetricKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;

const IDS_FILE: &str = "ids";
const MANIFEST_FILE: &str = "manifest.json";
const INDEX_FILE: &str = "index";

/// Line encoding for keys stored in the `ids` file.
pub trait KeyCodec: Sized {
    /// Encodes the key as a single line (no `\n` or `\r`).
    fn encode(&self) -> String;

    /// Decodes a line produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] when the line is not a valid key.
    fn decode(line: &str) -> Result<Self>;
}

macro_rules! numeric_key_codec {
    ($($ty:ty),+) => {
        $(
            impl KeyCodec for $ty {
                fn encode(&self) -> String {
                    self.to_string()
                }

                fn decode(line: &str) -> Result<Self> {
                    line.trim()
                        .parse()
                        .map_err(|e| Error::Serialization(format!("bad key '{line}': {e}")))
                }
            }
        )+
    };
}

numeric_key_codec!(i32, i64, u64);

impl KeyCodec for char {
    fn encode(&self) -> String {
        self.to_string()
    }

    fn decode(line: &str) -> Result<Self> {
        line.chars()
            .next()
            .ok_or_else(|| Error::Serialization("empty char key".to_string()))
    }
}

impl KeyCodec for String {
    fn encode(&self) -> String {
        self.clone()
    }

    fn decode(line: &str) -> Result<Self> {
        Ok(line.to_string())
    }
}

/// One input entry: a key and its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedItem<K> {
    /// Caller key.
    pub key: K,
    /// Vector stored for the key.
    pub vector: Vec<f32>,
}

impl<K> KeyedItem<K> {
    /// Creates a new entry.
    pub fn new(key: K, vector: Vec<f32>) -> Self {
        Self { key, vector }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    dimension: usize,
    metric: MetricKind,
}

/// Built index addressed by caller keys.
///
/// When a key appears more than once in the input, lookups by key resolve to
/// its last occurrence; every occurrence is still searchable.
#[derive(Debug)]
pub struct KeyedIndex<K> {
    keys: Vec<K>,
    positions: HashMap<K, i32>,
    index: Box<dyn AnnIndex>,
}

impl<K> KeyedIndex<K>
where
    K: KeyCodec + Eq + Hash + Clone,
{
    /// Builds an index over `input` with `n_trees` trees (`<= 0` = auto).
    ///
    /// The dimension is taken from the first vector.
    ///
    /// # Errors
    ///
    /// Fails on empty input, a zero-length first vector, or any vector whose
    /// length differs from the first.
    pub fn create(
        input: Vec<KeyedItem<K>>,
        n_trees: i32,
        metric: MetricKind,
        verbose: bool,
    ) -> Result<Self> {
        let Some(first) = input.first() else {
            return Err(Error::InvalidInput("input is empty".to_string()));
        };
        let mut index = create_index(metric, first.vector.len())?;
        index.verbose(verbose);

        let mut keys = Vec::with_capacity(input.len());
        for (position, item) in input.into_iter().enumerate() {
            let id = i32::try_from(position)
                .map_err(|_| Error::InvalidInput("too many items for 32-bit ids".to_string()))?;
            index.add_item(id, &item.vector)?;
            keys.push(item.key);
        }
        index.build(n_trees, -1)?;

        Ok(Self::assemble(keys, index))
    }

    /// Restores an index written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Fails if any of the three files is missing or malformed, or if the
    /// key count disagrees with the index.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest: Manifest =
            serde_json::from_str(&std::fs::read_to_string(dir.join(MANIFEST_FILE))?)?;
        let keys = std::fs::read_to_string(dir.join(IDS_FILE))?
            .lines()
            .map(K::decode)
            .collect::<Result<Vec<K>>>()?;

        let mut index = create_index(manifest.metric, manifest.dimension)?;
        index.load(&dir.join(INDEX_FILE), false)?;

        if usize::try_from(index.get_n_items()).ok() != Some(keys.len()) {
            return Err(Error::IndexFormat(format!(
                "{} keys for {} items",
                keys.len(),
                index.get_n_items()
            )));
        }
        Ok(Self::assemble(keys, index))
    }

    fn assemble(keys: Vec<K>, index: Box<dyn AnnIndex>) -> Self {
        let positions = keys
            .iter()
            .enumerate()
            .map(|(id, key)| (key.clone(), id as i32))
            .collect();
        Self {
            keys,
            positions,
            index,
        }
    }

    /// Writes the index to `dir`, creating the directory when missing.
    ///
    /// # Errors
    ///
    /// Fails if `dir` exists but is not a directory, if a key encoding
    /// holds a line break (`\n` or `\r`), or on I/O failure.
    pub fn save(&mut self, dir: &Path) -> Result<()> {
        if dir.exists() {
            if !dir.is_dir() {
                return Err(Error::InvalidInput(format!(
                    "{} is not a directory",
                    dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(dir)?;
        }

        let mut ids = String::new();
        for key in &self.keys {
            let line = key.encode();
            if line.contains(['\n', '\r']) {
                return Err(Error::InvalidInput(format!(
                    "key '{}' contains a line break",
                    line.escape_debug()
                )));
            }
            ids.push_str(&line);
            ids.push('\n');
        }
        std::fs::write(dir.join(IDS_FILE), ids)?;

        let manifest = Manifest {
            dimension: self.index.dimension(),
            metric: self.index.metric(),
        };
        std::fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        self.index.save(&dir.join(INDEX_FILE), false)?;
        tracing::info!(path = %dir.display(), n_keys = self.keys.len(), "keyed index saved");
        Ok(())
    }

    /// Up to `max` nearest keys to `vector`, closest first.
    #[must_use]
    pub fn query_vector(&self, vector: &[f32], max: usize, search_k: i32) -> Vec<(K, f32)> {
        let result = self.index.get_nns_by_vector(vector, max, search_k);
        self.resolve(&result.ids, &result.distances)
    }

    /// Up to `max` nearest keys to a stored key, or `None` for an unknown key.
    #[must_use]
    pub fn query_key(&self, key: &K, max: usize, search_k: i32) -> Option<Vec<(K, f32)>> {
        let &id = self.positions.get(key)?;
        let result = self.index.get_nns_by_item(id, max, search_k);
        Some(self.resolve(&result.ids, &result.distances))
    }

    /// Stored vector for `key`; thresholded to 0/1 for Hamming.
    #[must_use]
    pub fn get_item(&self, key: &K) -> Option<Vec<f32>> {
        let &id = self.positions.get(key)?;
        let mut out = vec![0.0; self.index.dimension()];
        self.index.get_item(id, &mut out).then_some(out)
    }

    fn resolve(&self, ids: &[i32], distances: &[f32]) -> Vec<(K, f32)> {
        ids.iter()
            .zip(distances)
            .filter_map(|(&id, &distance)| {
                let key = self.keys.get(usize::try_from(id).ok()?)?;
                Some((key.clone(), distance))
            })
            .collect()
    }

    /// Keys in id order.
    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false for a created or loaded index.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Vector length.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Metric the index was built with.
    #[must_use]
    pub fn metric(&self) -> MetricKind {
        self.index.metric()
    }
}
