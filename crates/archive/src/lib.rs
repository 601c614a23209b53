//! Archive schema layer for the h5vfs tools.
//!
//! Defines how directories, files, links and metadata are represented inside
//! an HDF5 container, and provides the small set of introspection operations
//! (link kinds, soft-link targets, raw byte reads) that both the packer and
//! the FUSE adapter rely on.
//!
//! The representation:
//! - a directory is a group
//! - a regular file is a 1-D `u8` dataset with `Created`, `Modified`,
//!   `Permissions` and `MD5Hash` attributes
//! - an out-of-archive symlink is a group carrying an `ExternalLink`
//!   attribute (such a group has no children)
//! - intra-archive soft and hard links are native container links
//! - the root of an archive produced by these tools carries an `H5VFS`
//!   version attribute

pub mod error;
pub mod raw;
pub mod schema;

pub use error::ArchiveError;
pub use raw::{
    attr_byte_len, dataset_byte_len, dataset_raw_offset, link_kind, read_attr_bytes,
    read_dataset_bytes, soft_link_target, LinkKind,
};
pub use schema::{
    read_i64_attr, read_string_attr, read_u32_attr, write_md5_attr, write_node_meta,
    write_string_attr, NodeMeta, ATTR_CREATED, ATTR_EXTERNAL_LINK, ATTR_FILE_TOKEN,
    ATTR_FORMAT_MARK, ATTR_MD5, ATTR_MODIFIED, ATTR_PERMISSIONS,
};
