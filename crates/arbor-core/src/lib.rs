//! # Arbor Core
//!
//! Approximate nearest-neighbor search over a forest of random-projection
//! trees, behind one interface for four distance metrics.
//!
//! ## Features
//!
//! - **4 Distance Metrics**: Angular, Euclidean, Manhattan, Hamming
//! - **Bit Packing**: Hamming vectors are thresholded at 0.5 and stored as
//!   packed 64-bit words
//! - **Reproducible Builds**: seeded, and independent of the build thread
//!   count
//! - **Persistent Storage**: single-file indexes, memory-mapped on load
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use arbor_core::{create_index, MetricKind};
//!
//! let mut index = create_index(MetricKind::Angular, 3)?;
//! index.add_item(0, &[1.0, 0.0, 0.0])?;
//! index.add_item(1, &[0.0, 1.0, 0.0])?;
//! index.build(10, 1)?;
//!
//! let nearest = index.get_nns_by_vector(&[0.9, 0.1, 0.0], 1, -1);
//! assert_eq!(nearest.ids, vec![0]);
//!
//! index.save("vectors.arbor".as_ref(), false)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// =============================================================================
// NUMERIC CAST LINTS
// =============================================================================
// Item ids and counts are i32 at the boundary and usize internally.
// Prefer try_from() where a value comes from outside the crate.
// =============================================================================
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]

pub mod config;
pub mod distance;
#[cfg(test)]
mod distance_tests;
pub mod engine;
pub mod error;
pub mod hamming;
pub mod index;
pub mod keyed;
pub mod metric;
#[cfg(test)]
mod metric_tests;

pub use config::{ArborConfig, BuildConfig, ConfigError, LoggingConfig, SearchConfig};
pub use engine::{BuildState, ForestIndex};
pub use error::{Error, Result};
pub use hamming::HammingIndex;
pub use index::{create_index, AnnIndex, Neighbors};
pub use keyed::{KeyCodec, KeyedIndex, KeyedItem};
pub use metric::{ElementKind, MetricKind};
