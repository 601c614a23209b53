//! Thin `hdf5-sys` shims for introspection the high-level crate does not
//! expose: link kinds, soft-link targets, raw dataset offsets, and raw byte
//! reads of datasets and attributes.
//!
//! All unsafe FFI in the workspace lives in this module. Callers must hold
//! whatever serialization discipline the process uses for container access
//! (the packer is single-threaded; the FUSE adapter calls in under its
//! state mutex).

use std::ffi::CString;
use std::os::raw::c_void;

use hdf5::{Attribute, Dataset, File};
use hdf5_sys::h5::haddr_t;
use hdf5_sys::h5a::H5Aread;
use hdf5_sys::h5d::{H5Dget_offset, H5Dread};
use hdf5_sys::h5l::{H5Lget_info, H5Lget_val, H5L_info_t, H5L_type_t};
use hdf5_sys::h5p::H5P_DEFAULT;
use hdf5_sys::h5s::H5S_ALL;

use crate::error::ArchiveError;

/// Kind of a container link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Name bound directly to an object (also the result of hard-linking).
    Hard,
    /// Intra-archive symbolic reference, target stored as a path string.
    Soft,
    /// Native cross-file link. Not produced by the packer, which models
    /// external links as groups with an `ExternalLink` attribute.
    External,
    /// Anything else (user-defined link classes).
    Other,
}

fn c_path(path: &str) -> Result<CString, ArchiveError> {
    CString::new(path).map_err(ArchiveError::schema)
}

fn get_link_info(file: &File, path: &str) -> Result<Option<H5L_info_t>, ArchiveError> {
    let name: CString = c_path(path)?;
    let mut info: H5L_info_t = unsafe { std::mem::zeroed() };
    let status: i32 = unsafe { H5Lget_info(file.id(), name.as_ptr(), &mut info, H5P_DEFAULT) };
    if status < 0 {
        return Ok(None);
    }
    Ok(Some(info))
}

/// Kind of the link at `path`, or `None` if no such link exists.
///
/// # Arguments
/// * `file` - Open container
/// * `path` - Archive-absolute path
pub fn link_kind(file: &File, path: &str) -> Result<Option<LinkKind>, ArchiveError> {
    let info: H5L_info_t = match get_link_info(file, path)? {
        Some(info) => info,
        None => return Ok(None),
    };
    Ok(Some(match info.type_ {
        H5L_type_t::H5L_TYPE_HARD => LinkKind::Hard,
        H5L_type_t::H5L_TYPE_SOFT => LinkKind::Soft,
        H5L_type_t::H5L_TYPE_EXTERNAL => LinkKind::External,
        _ => LinkKind::Other,
    }))
}

/// Target path recorded in the soft link at `path`.
///
/// Returns `None` if `path` is not a soft link. The target is returned as
/// stored, unresolved.
pub fn soft_link_target(file: &File, path: &str) -> Result<Option<String>, ArchiveError> {
    let info: H5L_info_t = match get_link_info(file, path)? {
        Some(info) => info,
        None => return Ok(None),
    };
    if !matches!(info.type_, H5L_type_t::H5L_TYPE_SOFT) {
        return Ok(None);
    }

    // val_size counts the stored target including its NUL terminator.
    let len: usize = unsafe { info.u.val_size } as usize;
    if len == 0 {
        return Ok(None);
    }

    let name: CString = c_path(path)?;
    let mut buf: Vec<u8> = vec![0u8; len];
    let status: i32 = unsafe {
        H5Lget_val(
            file.id(),
            name.as_ptr(),
            buf.as_mut_ptr() as *mut c_void,
            len,
            H5P_DEFAULT,
        )
    };
    if status < 0 {
        return Err(ArchiveError::Schema(format!(
            "failed to read soft link value at {}",
            path
        )));
    }

    while buf.last() == Some(&0) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Byte offset of a dataset's contiguous storage within the container file.
///
/// `None` when the library cannot report one (chunked layout, filters, or
/// storage not yet allocated), in which case readers must fall back to a
/// full decode.
pub fn dataset_raw_offset(ds: &Dataset) -> Option<u64> {
    let addr: haddr_t = unsafe { H5Dget_offset(ds.id()) };
    if addr == haddr_t::MAX {
        None
    } else {
        Some(addr)
    }
}

/// Total byte length of a dataset: element count times element size.
pub fn dataset_byte_len(ds: &Dataset) -> Result<u64, ArchiveError> {
    Ok(ds.size() as u64 * ds.dtype()?.size() as u64)
}

/// Read a dataset's full contents as raw bytes, whatever its element type.
pub fn read_dataset_bytes(ds: &Dataset) -> Result<Vec<u8>, ArchiveError> {
    let len: usize = dataset_byte_len(ds)? as usize;
    let mut buf: Vec<u8> = vec![0u8; len];
    if len == 0 {
        return Ok(buf);
    }

    let dtype: hdf5::Datatype = ds.dtype()?;
    let status: i32 = unsafe {
        H5Dread(
            ds.id(),
            dtype.id(),
            H5S_ALL,
            H5S_ALL,
            H5P_DEFAULT,
            buf.as_mut_ptr() as *mut c_void,
        )
    };
    if status < 0 {
        return Err(ArchiveError::Schema(format!(
            "raw read failed for dataset {}",
            ds.name()
        )));
    }
    Ok(buf)
}

/// Byte length of an attribute: element size times element count.
pub fn attr_byte_len(attr: &Attribute) -> Result<u64, ArchiveError> {
    Ok(attr.size() as u64 * attr.dtype()?.size() as u64)
}

/// Read an attribute's value as the raw bytes of its stored representation,
/// concatenated across all elements.
pub fn read_attr_bytes(attr: &Attribute) -> Result<Vec<u8>, ArchiveError> {
    let len: usize = attr_byte_len(attr)? as usize;
    let mut buf: Vec<u8> = vec![0u8; len];
    if len == 0 {
        return Ok(buf);
    }

    let dtype: hdf5::Datatype = attr.dtype()?;
    let status: i32 = unsafe { H5Aread(attr.id(), dtype.id(), buf.as_mut_ptr() as *mut c_void) };
    if status < 0 {
        return Err(ArchiveError::Schema(
            "raw read failed for attribute".to_string(),
        ));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> (tempfile::TempDir, hdf5::File) {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let file: hdf5::File = hdf5::File::create(dir.path().join(name)).unwrap();
        (dir, file)
    }

    #[test]
    fn test_link_kind_classification() {
        let (_dir, file) = scratch_file("links.h5");
        let group: hdf5::Group = file.create_group("base").unwrap();
        let ds: hdf5::Dataset = group.new_dataset::<u8>().shape(3).create("x").unwrap();
        ds.write_slice(&[1u8, 2, 3], ndarray::s![0..3]).unwrap();

        file.link_hard("/base/x", "/base/y").unwrap();
        file.link_soft("/base/x", "/base/z").unwrap();

        assert_eq!(link_kind(&file, "/base/x").unwrap(), Some(LinkKind::Hard));
        assert_eq!(link_kind(&file, "/base/y").unwrap(), Some(LinkKind::Hard));
        assert_eq!(link_kind(&file, "/base/z").unwrap(), Some(LinkKind::Soft));
        assert_eq!(link_kind(&file, "/base/missing").unwrap(), None);
    }

    #[test]
    fn test_soft_link_target() {
        let (_dir, file) = scratch_file("soft.h5");
        let group: hdf5::Group = file.create_group("base").unwrap();
        group.new_dataset::<u8>().shape(1).create("t").unwrap();
        file.link_soft("/base/t", "/base/l").unwrap();

        assert_eq!(
            soft_link_target(&file, "/base/l").unwrap().as_deref(),
            Some("/base/t")
        );
        // A hard link has no stored target
        assert_eq!(soft_link_target(&file, "/base/t").unwrap(), None);
    }

    #[test]
    fn test_dataset_bytes_and_offset() {
        let (_dir, file) = scratch_file("bytes.h5");
        let ds: hdf5::Dataset = file.new_dataset::<u8>().shape(5).create("data").unwrap();
        ds.write_slice(&[10u8, 20, 30, 40, 50], ndarray::s![0..5])
            .unwrap();

        assert_eq!(dataset_byte_len(&ds).unwrap(), 5);
        assert_eq!(read_dataset_bytes(&ds).unwrap(), vec![10, 20, 30, 40, 50]);
        // Contiguous storage written through: the library reports an offset
        assert!(dataset_raw_offset(&ds).is_some());
    }

    #[test]
    fn test_empty_dataset_bytes() {
        let (_dir, file) = scratch_file("empty.h5");
        let ds: hdf5::Dataset = file.new_dataset::<u8>().shape(0).create("empty").unwrap();

        assert_eq!(dataset_byte_len(&ds).unwrap(), 0);
        assert!(read_dataset_bytes(&ds).unwrap().is_empty());
    }

    #[test]
    fn test_attr_bytes() {
        let (_dir, file) = scratch_file("attr.h5");
        let group: hdf5::Group = file.create_group("node").unwrap();
        group
            .new_attr::<i64>()
            .create("Modified")
            .unwrap()
            .write_scalar(&0x0102030405060708i64)
            .unwrap();

        let attr: hdf5::Attribute = group.attr("Modified").unwrap();
        assert_eq!(attr_byte_len(&attr).unwrap(), 8);
        let bytes: Vec<u8> = read_attr_bytes(&attr).unwrap();
        assert_eq!(bytes.len(), 8);
        // Stored little-endian on every platform we build for
        assert_eq!(bytes[0], 0x08);
    }
}
