//! Read-only FUSE filesystem over h5vfs HDF5 archives.
//!
//! Groups appear as directories, 1-D byte datasets as regular files, soft
//! links and `ExternalLink` groups as symlinks. On archives not produced by
//! the packer, attributes are additionally surfaced as hidden
//! `.<name>.attr.<attr>` files.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: FUSE interface (fuser::Filesystem impl, one mutex at the boundary)
//! Layer 2: VFS operations (resolve, readdir listing, clipped reads)
//! Layer 1: Primitives (Resolver, OpenFileTable, archive introspection)
//! ```

pub mod error;
pub mod fs;
pub mod resolver;
pub mod table;

pub use error::VfsError;
pub use fs::H5Vfs;
pub use resolver::{EntryKind, FileMeta, Node, Resolver};
pub use table::OpenFileTable;
