//! Supported distance metrics and their storage element types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of bits in one packed storage word.
pub const BITS_PER_WORD: usize = 64;

/// Distance metric selected when an index is created.
///
/// The metric is fixed for the lifetime of a handle and decides which
/// storage element type backs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Angular distance, `sqrt(2 - 2 * cos(a, b))`.
    Angular,
    /// Euclidean distance (L2 norm).
    Euclidean,
    /// Manhattan distance (L1 norm).
    Manhattan,
    /// Hamming distance over thresholded bits.
    ///
    /// Stored as packed 64-bit words; see [`crate::hamming`].
    Hamming,
}

/// Native element type stored by the engine for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    /// One `f32` per dimension.
    F32,
    /// One bit per dimension, packed into `u64` words.
    PackedU64,
}

impl MetricKind {
    /// All metrics, in factory order.
    pub const ALL: [Self; 4] = [
        Self::Angular,
        Self::Euclidean,
        Self::Manhattan,
        Self::Hamming,
    ];

    /// Returns the storage element type used for this metric.
    #[must_use]
    pub const fn element_kind(&self) -> ElementKind {
        match self {
            Self::Angular | Self::Euclidean | Self::Manhattan => ElementKind::F32,
            Self::Hamming => ElementKind::PackedU64,
        }
    }

    /// Returns the number of stored elements for an external dimension `f`.
    ///
    /// Float metrics store `f` values; Hamming stores `ceil(f / 64)` words.
    #[must_use]
    pub const fn internal_dimension(&self, f: usize) -> usize {
        match self.element_kind() {
            ElementKind::F32 => f,
            ElementKind::PackedU64 => f.div_ceil(BITS_PER_WORD),
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Angular => "angular",
            Self::Euclidean => "euclidean",
            Self::Manhattan => "manhattan",
            Self::Hamming => "hamming",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "angular" | "cosine" => Ok(Self::Angular),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "manhattan" | "l1" => Ok(Self::Manhattan),
            "hamming" => Ok(Self::Hamming),
            other => Err(format!("unknown metric '{other}'")),
        }
    }
}
