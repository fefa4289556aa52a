//! Error types for Arbor.
//!
//! Every fallible index operation reports one of these variants. The C ABI
//! flattens them into a boolean plus the rendered message, so messages are
//! written to be shown to end users as-is.

use thiserror::Error;

/// Result type alias for Arbor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Arbor operations.
///
/// Error codes follow the pattern `ARBOR-XXX` for easy debugging.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation not allowed in the current build state (ARBOR-001).
    ///
    /// Adding to a built index, building twice, unbuilding a loaded index,
    /// saving an index that was never built.
    #[error("[ARBOR-001] Invalid state: {0}")]
    InvalidState(String),

    /// Dimension mismatch (ARBOR-002).
    #[error("[ARBOR-002] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Invalid dimension at creation time (ARBOR-003).
    #[error("[ARBOR-003] Invalid dimension: {0}")]
    InvalidDimension(usize),

    /// Item id rejected (ARBOR-004).
    #[error("[ARBOR-004] Invalid item id {0}: ids must be non-negative")]
    InvalidItem(i32),

    /// Persisted index does not match this handle (ARBOR-005).
    #[error("[ARBOR-005] Index format error: {0}")]
    IndexFormat(String),

    /// IO error (ARBOR-006).
    #[error("[ARBOR-006] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (ARBOR-007).
    #[error("[ARBOR-007] Serialization error: {0}")]
    Serialization(String),

    /// Invalid caller input outside the index itself (ARBOR-008).
    #[error("[ARBOR-008] Invalid input: {0}")]
    InvalidInput(String),

    /// Build failed (ARBOR-009).
    #[error("[ARBOR-009] Build error: {0}")]
    Build(String),
}

impl Error {
    /// Returns the error code (e.g., "ARBOR-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidState(_) => "ARBOR-001",
            Self::DimensionMismatch { .. } => "ARBOR-002",
            Self::InvalidDimension(_) => "ARBOR-003",
            Self::InvalidItem(_) => "ARBOR-004",
            Self::IndexFormat(_) => "ARBOR-005",
            Self::Io(_) => "ARBOR-006",
            Self::Serialization(_) => "ARBOR-007",
            Self::InvalidInput(_) => "ARBOR-008",
            Self::Build(_) => "ARBOR-009",
        }
    }

    /// Returns true if the caller can recover without discarding the handle.
    ///
    /// A handle created with a zero dimension is unusable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidDimension(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io) => Self::Io(io),
            other => Self::Serialization(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
