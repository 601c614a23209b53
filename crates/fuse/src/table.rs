//! Open-file table: refcounted dataset handles keyed by mount-relative path.

use std::collections::HashMap;
use std::path::Path;

use hdf5::{Dataset, File};

use h5vfs_archive::{dataset_byte_len, dataset_raw_offset, read_dataset_bytes};

use crate::error::VfsError;

/// One open dataset shared by every kernel open of the same path.
struct OpenDataset {
    dataset: Dataset,
    len: u64,
    /// Fully materialized bytes, populated by the full-decode read path.
    cache: Option<Vec<u8>>,
    refcount: u32,
}

/// Maps mount-relative paths to open dataset handles.
///
/// Entries are created on first `open`, refcounted across repeated opens of
/// the same path, and evicted (closing the dataset and dropping any cached
/// buffer) when the refcount returns to zero.
#[derive(Default)]
pub struct OpenFileTable {
    files: HashMap<String, OpenDataset>,
}

impl OpenFileTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` as a dataset, or bump the refcount of an existing handle.
    pub fn open(&mut self, archive: &File, path: &str) -> Result<(), VfsError> {
        if let Some(entry) = self.files.get_mut(path) {
            entry.refcount += 1;
            return Ok(());
        }
        let dataset: Dataset = archive
            .dataset(path)
            .map_err(|_| VfsError::NotFound(path.to_string()))?;
        let len: u64 = dataset_byte_len(&dataset)?;
        self.files.insert(
            path.to_string(),
            OpenDataset {
                dataset,
                len,
                cache: None,
                refcount: 1,
            },
        );
        Ok(())
    }

    /// Whether `path` has an open handle.
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Number of open handles.
    pub fn open_count(&self) -> usize {
        self.files.len()
    }

    /// Read up to `size` bytes at `offset` from the open dataset at `path`.
    ///
    /// The requested range is clipped to the dataset length; reads at or
    /// past the end return an empty buffer. Bytes come, in order of
    /// preference, from the cached buffer, from a direct read of the
    /// container file at the dataset's raw offset, or from a full decode
    /// that populates the cache.
    ///
    /// # Arguments
    /// * `container_path` - Host path of the mounted archive file
    /// * `path` - Mount-relative path of the open dataset
    /// * `offset` - Byte offset into the dataset
    /// * `size` - Requested byte count
    pub fn read(
        &mut self,
        container_path: &Path,
        path: &str,
        offset: u64,
        size: u32,
    ) -> Result<Vec<u8>, VfsError> {
        let entry: &mut OpenDataset = self
            .files
            .get_mut(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;

        if offset >= entry.len {
            return Ok(Vec::new());
        }
        let count: usize = (size as u64).min(entry.len - offset) as usize;
        let start: usize = offset as usize;

        if let Some(cache) = &entry.cache {
            return Ok(cache[start..start + count].to_vec());
        }

        // Fast path: contiguous storage lets us read the container file
        // directly at the dataset's byte offset.
        if let Some(raw_offset) = dataset_raw_offset(&entry.dataset) {
            match read_container_at(container_path, raw_offset + offset, count) {
                Ok(buf) => return Ok(buf),
                Err(err) => {
                    tracing::debug!(
                        "raw read of {} failed ({}), falling back to full decode",
                        path,
                        err
                    );
                }
            }
        }

        // Fallback: materialize the dataset once and serve from memory.
        let bytes: Vec<u8> = read_dataset_bytes(&entry.dataset)?;
        let out: Vec<u8> = bytes[start..start + count].to_vec();
        entry.cache = Some(bytes);
        Ok(out)
    }

    /// Drop one reference to `path`, evicting the handle at zero.
    pub fn release(&mut self, path: &str) -> Result<(), VfsError> {
        let entry: &mut OpenDataset = self
            .files
            .get_mut(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        entry.refcount -= 1;
        if entry.refcount == 0 {
            self.files.remove(path);
        }
        Ok(())
    }
}

/// Read `count` bytes of the container file starting at `offset`.
fn read_container_at(path: &Path, offset: u64, count: usize) -> std::io::Result<Vec<u8>> {
    use std::os::unix::fs::FileExt;

    let file: std::fs::File = std::fs::File::open(path)?;
    let mut buf: Vec<u8> = vec![0u8; count];
    file.read_exact_at(&mut buf, offset)?;
    Ok(buf)
}
