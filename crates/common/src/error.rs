//! Shared error types used across the h5vfs crates.

use thiserror::Error;

/// Failures of the path reduction and link-path composition in
/// `path_utils`. Each variant corresponds to one way a host path can fail
/// to map into the archive's path model.
#[derive(Debug, Error, Clone)]
pub enum PathError {
    /// A link target escapes the base directory being packed, so no
    /// archive-absolute path exists for it.
    #[error("link target {target} is not under the base directory {base}")]
    TargetOutsideBase {
        /// The offending target path.
        target: String,
        /// The base directory of the walk.
        base: String,
    },

    /// The base directory has no final component to name its top-level
    /// group (the filesystem root cannot be packed under a name).
    #[error("cannot derive a top-level group name from {base}")]
    UnnamedBase {
        /// The base directory of the walk.
        base: String,
    },

    /// A relative path could not be anchored because the working directory
    /// is unavailable.
    #[error("cannot resolve {path} against the working directory: {message}")]
    WorkingDir {
        /// The relative path being anchored.
        path: String,
        /// Underlying error message.
        message: String,
    },
}
