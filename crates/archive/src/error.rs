//! Error types for the archive schema layer.

use thiserror::Error;

/// Errors raised while reading or writing the archive schema.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Low-level container library failure.
    #[error("container error: {0}")]
    Container(#[from] hdf5::Error),

    /// A stored value does not fit the schema (wrong type, bad string, ...).
    #[error("schema error: {0}")]
    Schema(String),
}

impl ArchiveError {
    /// Create a schema error from anything displayable.
    pub fn schema(reason: impl std::fmt::Display) -> Self {
        Self::Schema(reason.to_string())
    }
}
