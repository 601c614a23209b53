//! Directory-tree packer for h5vfs archives.
//!
//! Walks one or more source trees and coalesces them into a single HDF5
//! archive using the schema from `h5vfs-archive`:
//! - `PackOptions` - filtering, update and symlink policies
//! - `decide_store` - the per-entry policy engine
//! - `Packer` - the recursive walker with deferred hard-link resolution

pub mod error;
pub mod options;
pub mod policy;
pub mod walker;

pub use error::PackError;
pub use options::{compile_patterns, glob_to_regex, ExternalSymlinkPolicy, PackOptions, UpdatePolicy};
pub use policy::{decide_store, LinkTarget, PackContext, StoreDecision};
pub use walker::{open_or_create_archive, Packer};
