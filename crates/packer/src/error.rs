//! Error types for the packer.

use thiserror::Error;

use h5vfs_archive::ArchiveError;
use h5vfs_common::PathError;

/// Errors raised while packing a tree into an archive.
#[derive(Debug, Error)]
pub enum PackError {
    /// Low-level container library failure. Fatal for the run.
    #[error("container error: {0}")]
    Container(#[from] hdf5::Error),

    /// Schema-level archive failure. Fatal for the run.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Path composition failure (link target outside the base, ...).
    #[error(transparent)]
    Path(#[from] PathError),

    /// Source filesystem failure. Abandons the entry, not the run.
    #[error("IO error at {path}: {source}")]
    SourceIo {
        /// Source path where the error occurred.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A filter pattern failed to compile.
    #[error("invalid pattern \"{pattern}\": {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Invalid option combination (new root without `--newroots`, ...).
    #[error("{0}")]
    Config(String),
}

impl PackError {
    /// Create a SourceIo error for a path.
    pub fn source_io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::SourceIo {
            path: path.display().to_string(),
            source,
        }
    }
}
