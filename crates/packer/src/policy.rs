//! Per-entry store decisions.
//!
//! `decide_store` inspects one source entry (file, symlink or directory)
//! against the destination group and the run configuration, and decides how
//! the entry is represented in the archive. All run-scoped mutable state
//! (inode deduplication, single-file symlink deduplication) lives in an
//! explicit `PackContext` passed through the walk.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use hdf5::Group;

use h5vfs_archive::{read_i64_attr, read_string_attr, ATTR_MD5, ATTR_MODIFIED};
use h5vfs_common::{hash_file_chunked, is_under_base};

use crate::error::PackError;
use crate::options::{ExternalSymlinkPolicy, PackOptions, UpdatePolicy};

/// Target of an intra-archive soft link produced by the policy engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Filesystem path under the base; composed into an archive path by the
    /// walker.
    Source(PathBuf),
    /// Archive-absolute path, used verbatim.
    Archive(String),
}

/// How a single entry is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreDecision {
    /// Omit the entry.
    DontStore,
    /// Write the entry's bytes (or, for a directory, descend into it).
    AsInternal,
    /// Hard-link to the copy first stored for this inode; carries the
    /// filesystem path of that first copy.
    AsHardLink(PathBuf),
    /// Soft-link to an intra-archive target.
    AsSoftLink(LinkTarget),
    /// Record an out-of-archive symlink; carries the raw link text.
    AsExternalLink(String),
}

/// Run-scoped mutable state consulted by the policy engine.
#[derive(Debug, Default)]
pub struct PackContext {
    /// Source inode number to the first path stored for it.
    pub inode_map: HashMap<u64, PathBuf>,
    /// External link text to the archive path of its first inlined copy
    /// (`storeexternalsymlinks=singlefile`).
    pub single_file_map: HashMap<PathBuf, String>,
}

impl PackContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Archive-absolute path of `name` within `group`.
pub(crate) fn dest_archive_path(group: &Group, name: &str) -> String {
    let group_name: String = group.name();
    if group_name == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", group_name, name)
    }
}

/// Decide how to store one entry.
///
/// # Arguments
/// * `group` - Destination group
/// * `base` - Base path of the walk
/// * `source` - Source filesystem path of the entry
/// * `name` - Name the entry will take inside `group`
/// * `is_dir` - Whether the entry is a directory (selects the regex lists)
/// * `opts` - Run configuration
/// * `ctx` - Run-scoped deduplication state
///
/// # Errors
/// `SourceIo` when the source cannot be inspected (the caller abandons the
/// entry); container errors are fatal.
#[allow(clippy::too_many_arguments)]
pub fn decide_store(
    group: &Group,
    base: &Path,
    source: &Path,
    name: &str,
    is_dir: bool,
    opts: &PackOptions,
    ctx: &mut PackContext,
) -> Result<StoreDecision, PackError> {
    // Regex filter first; a reject always wins.
    let accepted: bool = if is_dir {
        opts.accepts_dir(name)
    } else {
        opts.accepts_file(name)
    };
    if !accepted {
        return Ok(StoreDecision::DontStore);
    }

    let meta: Metadata =
        std::fs::symlink_metadata(source).map_err(|e| PackError::source_io(source, e))?;
    let is_symlink: bool = meta.file_type().is_symlink();
    let existing: bool = group.link_exists(name);

    if !is_symlink && !existing {
        return Ok(decide_new_entry(&meta, source, ctx));
    }

    if is_symlink && !existing {
        return decide_symlink(group, base, source, name, opts, ctx);
    }

    // Destination already present.
    if is_symlink {
        return Ok(StoreDecision::DontStore);
    }
    if is_dir {
        // Size/time/hash comparisons are dataset-shaped; for an existing
        // group anything but `never` descends so per-file policies can run.
        return Ok(match opts.update_policy {
            UpdatePolicy::Never => StoreDecision::DontStore,
            _ => StoreDecision::AsInternal,
        });
    }
    decide_update(group, source, name, &meta, opts)
}

/// First-sighting path for regular files (and directories): single-linked
/// sources inline directly, multi-linked sources go through the inode map.
fn decide_new_entry(meta: &Metadata, source: &Path, ctx: &mut PackContext) -> StoreDecision {
    if meta.nlink() == 1 {
        return StoreDecision::AsInternal;
    }
    match ctx.inode_map.entry(meta.ino()) {
        Entry::Vacant(slot) => {
            slot.insert(source.to_path_buf());
            StoreDecision::AsInternal
        }
        Entry::Occupied(slot) => StoreDecision::AsHardLink(slot.get().clone()),
    }
}

/// Symlink handling: intra-base targets become soft links, everything else
/// follows the configured external-symlink policy.
fn decide_symlink(
    group: &Group,
    base: &Path,
    source: &Path,
    name: &str,
    opts: &PackOptions,
    ctx: &mut PackContext,
) -> Result<StoreDecision, PackError> {
    let link_text: PathBuf = match std::fs::read_link(source) {
        Ok(target) => target,
        Err(err) => {
            log::warn!("cannot read symlink {}: {}", source.display(), err);
            return Ok(StoreDecision::DontStore);
        }
    };

    // Relative targets resolve against the base path.
    let resolved: PathBuf = if link_text.is_absolute() {
        link_text.clone()
    } else {
        base.join(&link_text)
    };

    if is_under_base(&resolved, base) {
        return Ok(StoreDecision::AsSoftLink(LinkTarget::Source(resolved)));
    }

    Ok(match opts.external_symlinks {
        ExternalSymlinkPolicy::Ignore => StoreDecision::DontStore,
        ExternalSymlinkPolicy::File => StoreDecision::AsInternal,
        ExternalSymlinkPolicy::SingleFile => {
            let dest: String = dest_archive_path(group, name);
            match ctx.single_file_map.entry(link_text) {
                Entry::Vacant(slot) => {
                    slot.insert(dest);
                    StoreDecision::AsInternal
                }
                Entry::Occupied(slot) => {
                    StoreDecision::AsSoftLink(LinkTarget::Archive(slot.get().clone()))
                }
            }
        }
        ExternalSymlinkPolicy::Link => {
            StoreDecision::AsExternalLink(link_text.to_string_lossy().into_owned())
        }
    })
}

/// Update policy for an already-present dataset.
fn decide_update(
    group: &Group,
    source: &Path,
    name: &str,
    meta: &Metadata,
    opts: &PackOptions,
) -> Result<StoreDecision, PackError> {
    match opts.update_policy {
        UpdatePolicy::Never => Ok(StoreDecision::DontStore),
        UpdatePolicy::Always => Ok(StoreDecision::AsInternal),
        UpdatePolicy::FileSize => {
            let ds: hdf5::Dataset = group.dataset(name)?;
            if ds.size() as u64 == meta.len() {
                Ok(StoreDecision::DontStore)
            } else {
                Ok(StoreDecision::AsInternal)
            }
        }
        UpdatePolicy::FileTime => {
            let ds: hdf5::Dataset = group.dataset(name)?;
            if read_i64_attr(&ds, ATTR_MODIFIED) == Some(meta.mtime()) {
                Ok(StoreDecision::DontStore)
            } else {
                Ok(StoreDecision::AsInternal)
            }
        }
        UpdatePolicy::Hash => {
            let ds: hdf5::Dataset = group.dataset(name)?;
            let stored: Option<String> = read_string_attr(&ds, ATTR_MD5)?;
            let digest: String = hash_file_chunked(source, opts.chunk_size)
                .map_err(|e| PackError::source_io(source, e))?;
            if stored.as_deref() == Some(digest.as_str()) {
                Ok(StoreDecision::DontStore)
            } else {
                Ok(StoreDecision::AsInternal)
            }
        }
    }
}
