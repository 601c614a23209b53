//! Attribute vocabulary and per-node metadata.

use hdf5::types::{FixedAscii, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Attribute, Location};

use crate::error::ArchiveError;
use crate::raw::read_attr_bytes;

/// Epoch seconds the node was created (ctime at pack time).
pub const ATTR_CREATED: &str = "Created";
/// Epoch seconds the node was last modified (mtime at pack time).
pub const ATTR_MODIFIED: &str = "Modified";
/// POSIX mode bits of the source entry.
pub const ATTR_PERMISSIONS: &str = "Permissions";
/// Lowercase hex MD5 of a dataset's bytes.
pub const ATTR_MD5: &str = "MD5Hash";
/// Marks a group as an out-of-archive symlink; the value is the target path.
pub const ATTR_EXTERNAL_LINK: &str = "ExternalLink";
/// Root attribute stamped by the packer; also disables attribute surfacing.
pub const ATTR_FORMAT_MARK: &str = "H5VFS";
/// Separator inside synthetic attribute-as-file names (`.X.attr.A`).
pub const ATTR_FILE_TOKEN: &str = ".attr.";

/// Source metadata attached to every packed group and dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMeta {
    /// Creation time, epoch seconds.
    pub created: i64,
    /// Modification time, epoch seconds.
    pub modified: i64,
    /// Full `st_mode` of the source entry.
    pub permissions: u32,
}

/// Attach `Created`, `Modified` and `Permissions` to a group or dataset.
///
/// # Arguments
/// * `loc` - Group or dataset to annotate
/// * `meta` - Source metadata
pub fn write_node_meta(loc: &Location, meta: &NodeMeta) -> Result<(), ArchiveError> {
    loc.new_attr::<i64>()
        .create(ATTR_CREATED)?
        .write_scalar(&meta.created)?;
    loc.new_attr::<i64>()
        .create(ATTR_MODIFIED)?
        .write_scalar(&meta.modified)?;
    loc.new_attr::<u32>()
        .create(ATTR_PERMISSIONS)?
        .write_scalar(&meta.permissions)?;
    Ok(())
}

/// Read a scalar 64-bit integer attribute, `None` if absent.
pub fn read_i64_attr(loc: &Location, name: &str) -> Option<i64> {
    let attr: Attribute = loc.attr(name).ok()?;
    attr.read_scalar::<i64>().ok()
}

/// Read a scalar 32-bit unsigned attribute, `None` if absent.
pub fn read_u32_attr(loc: &Location, name: &str) -> Option<u32> {
    let attr: Attribute = loc.attr(name).ok()?;
    attr.read_scalar::<u32>().ok()
}

/// Write the MD5 attribute of a dataset.
///
/// Stored as a fixed-length 32-byte ASCII scalar.
///
/// # Arguments
/// * `loc` - Dataset to annotate
/// * `hex` - 32-character lowercase hex digest
pub fn write_md5_attr(loc: &Location, hex: &str) -> Result<(), ArchiveError> {
    let value: FixedAscii<32> =
        FixedAscii::from_ascii(hex.as_bytes()).map_err(ArchiveError::schema)?;
    loc.new_attr::<FixedAscii<32>>()
        .create(ATTR_MD5)?
        .write_scalar(&value)?;
    Ok(())
}

/// Write a general string attribute (`ExternalLink`, `H5VFS`).
///
/// # Arguments
/// * `loc` - Group or dataset to annotate
/// * `name` - Attribute name
/// * `value` - String value
pub fn write_string_attr(loc: &Location, name: &str, value: &str) -> Result<(), ArchiveError> {
    let value: VarLenUnicode = value.parse().map_err(ArchiveError::schema)?;
    loc.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

/// Read a string attribute, tolerating the representations found in the
/// wild: variable-length ASCII/UTF-8 and fixed-length strings (the layout
/// the original C++ tool wrote). Returns `None` if the attribute is absent.
///
/// # Errors
/// Returns error if the attribute exists but is not string-typed.
pub fn read_string_attr(loc: &Location, name: &str) -> Result<Option<String>, ArchiveError> {
    let attr: Attribute = match loc.attr(name) {
        Ok(attr) => attr,
        Err(_) => return Ok(None),
    };

    let descriptor: TypeDescriptor = attr.dtype()?.to_descriptor()?;
    let value: String = match descriptor {
        TypeDescriptor::VarLenAscii => attr.read_scalar::<VarLenAscii>()?.to_string(),
        TypeDescriptor::VarLenUnicode => attr.read_scalar::<VarLenUnicode>()?.to_string(),
        TypeDescriptor::FixedAscii(_) | TypeDescriptor::FixedUnicode(_) => {
            let mut bytes: Vec<u8> = read_attr_bytes(&attr)?;
            while bytes.last() == Some(&0) {
                bytes.pop();
            }
            String::from_utf8_lossy(&bytes).into_owned()
        }
        other => {
            return Err(ArchiveError::Schema(format!(
                "attribute {} is not a string (stored type {:?})",
                name, other
            )))
        }
    };
    Ok(Some(value))
}
