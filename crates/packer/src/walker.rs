//! Recursive tree walker writing into the archive.

use std::fs::Metadata;
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use hdf5::{Dataset, File, Group};
use ndarray::s;

use h5vfs_archive::{
    write_md5_attr, write_node_meta, write_string_attr, NodeMeta, ATTR_CREATED,
    ATTR_EXTERNAL_LINK, ATTR_FORMAT_MARK,
};
use h5vfs_common::{archive_link_path, last_path_chunk, Md5Hasher, EMPTY_MD5};

use crate::error::PackError;
use crate::options::PackOptions;
use crate::policy::{decide_store, dest_archive_path, LinkTarget, PackContext, StoreDecision};

/// A hard link whose source was not yet written when first requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredLink {
    /// Archive-absolute path of the link source.
    pub source: String,
    /// Archive-absolute path where the link is created.
    pub dest: String,
}

/// Walks source trees and writes groups, datasets and links.
pub struct Packer<'a> {
    archive: &'a File,
    opts: &'a PackOptions,
    ctx: PackContext,
    deferred: Vec<DeferredLink>,
}

impl<'a> Packer<'a> {
    /// Create a packer writing into `archive` under `opts`.
    pub fn new(archive: &'a File, opts: &'a PackOptions) -> Self {
        Self {
            archive,
            opts,
            ctx: PackContext::new(),
            deferred: Vec::new(),
        }
    }

    /// Coalesce one source root into the archive and drain the deferred-link
    /// queue.
    ///
    /// # Arguments
    /// * `base` - Absolute source directory; its last component names the
    ///   top-level group
    ///
    /// # Returns
    /// Number of items stored at or below the root.
    pub fn pack_root(&mut self, base: &Path) -> Result<usize, PackError> {
        let root: &Group = self.archive;
        let count: usize = self.coalesce(1, base, base, root)?;
        self.resolve_deferred();
        Ok(count)
    }

    /// Store the entry at `path` into `parent`, recursing into directories.
    ///
    /// # Returns
    /// Number of items stored at or below `path`.
    pub fn coalesce(
        &mut self,
        level: usize,
        base: &Path,
        path: &Path,
        parent: &Group,
    ) -> Result<usize, PackError> {
        let meta: Metadata = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) => {
                log::warn!("cannot stat {}: {}", path.display(), err);
                return Ok(0);
            }
        };

        let file_type = meta.file_type();
        if file_type.is_dir() {
            self.handle_directory(level, base, path, parent)
        } else if file_type.is_file() || file_type.is_symlink() {
            self.handle_file(level, base, path, parent)
        } else {
            // Sockets, fifos and device nodes have no archive representation
            Ok(0)
        }
    }

    fn handle_file(
        &mut self,
        level: usize,
        base: &Path,
        path: &Path,
        group: &Group,
    ) -> Result<usize, PackError> {
        let name: String = last_path_chunk(path);
        let indent: String = "  ".repeat(level);
        let existing: bool = group.link_exists(&name);

        let decision: StoreDecision =
            match decide_store(group, base, path, &name, false, self.opts, &mut self.ctx) {
                Ok(decision) => decision,
                Err(PackError::SourceIo { path, source }) => {
                    log::warn!("abandoning {}: {}", path, source);
                    return Ok(0);
                }
                Err(err) => return Err(err),
            };

        if matches!(decision, StoreDecision::DontStore) {
            log::info!("{}skipping dataset {}", indent, name);
            return Ok(0);
        }
        if existing {
            log::info!("{}overwriting dataset {}", indent, name);
        }

        let dest: String = dest_archive_path(group, &name);
        match decision {
            StoreDecision::DontStore => unreachable!(),
            StoreDecision::AsInternal => {
                if !existing {
                    log::info!("{}creating dataset {}", indent, name);
                }
                match self.store_file(group, path, &name) {
                    Ok(()) => Ok(1),
                    Err(PackError::SourceIo { path, source }) => {
                        log::warn!("abandoning {}: {}", path, source);
                        Ok(0)
                    }
                    Err(err) => Err(err),
                }
            }
            StoreDecision::AsHardLink(first_copy) => {
                if !existing {
                    log::info!("{}hard linking dataset {}", indent, name);
                }
                let target: String = match archive_link_path(base, &first_copy) {
                    Ok(target) => target,
                    Err(err) => {
                        log::warn!("cannot compose link path for {}: {}", name, err);
                        return Ok(0);
                    }
                };
                self.hard_link(target, dest)?;
                Ok(1)
            }
            StoreDecision::AsSoftLink(target) => {
                if !existing {
                    log::info!("{}soft linking dataset {}", indent, name);
                }
                let target: String = match self.compose_soft_target(base, target) {
                    Ok(target) => target,
                    Err(err) => {
                        log::warn!("cannot compose link path for {}: {}", name, err);
                        return Ok(0);
                    }
                };
                self.soft_link(&target, &dest)?;
                Ok(1)
            }
            StoreDecision::AsExternalLink(text) => {
                if !existing {
                    log::info!("{}linking dataset {} to external file {}", indent, name, text);
                }
                self.external_link(group, &name, &text)?;
                Ok(1)
            }
        }
    }

    fn handle_directory(
        &mut self,
        level: usize,
        base: &Path,
        path: &Path,
        parent: &Group,
    ) -> Result<usize, PackError> {
        let name: String = last_path_chunk(path);
        let indent: String = "  ".repeat(level);
        let existing: bool = parent.link_exists(&name);

        let decision: StoreDecision =
            match decide_store(parent, base, path, &name, true, self.opts, &mut self.ctx) {
                Ok(decision) => decision,
                Err(PackError::SourceIo { path, source }) => {
                    log::warn!("abandoning {}: {}", path, source);
                    return Ok(0);
                }
                Err(err) => return Err(err),
            };

        match decision {
            StoreDecision::DontStore => {
                log::info!("{}skipping directory {}", indent, name);
                Ok(0)
            }
            StoreDecision::AsSoftLink(target) => {
                let dest: String = dest_archive_path(parent, &name);
                let target: String = match self.compose_soft_target(base, target) {
                    Ok(target) => target,
                    Err(err) => {
                        log::warn!("cannot compose link path for {}: {}", name, err);
                        return Ok(0);
                    }
                };
                log::info!("{}soft linking directory {} to {}", indent, name, target);
                self.soft_link(&target, &dest)?;
                Ok(1)
            }
            StoreDecision::AsExternalLink(text) => {
                log::info!("{}linking directory {} to external path {}", indent, name, text);
                self.external_link(parent, &name, &text)?;
                Ok(1)
            }
            // AsInternal, or an inode-map hit that directory walks never
            // revisit in practice: descend.
            _ => {
                let group: Group = if existing {
                    log::info!("{}opening existing group {}", indent, name);
                    parent.group(&name)?
                } else {
                    log::info!("{}creating group {}", indent, name);
                    let meta: Metadata = match std::fs::metadata(path) {
                        Ok(meta) => meta,
                        Err(err) => {
                            log::warn!("cannot stat {}: {}", path.display(), err);
                            return Ok(0);
                        }
                    };
                    let group: Group = parent.create_group(&name)?;
                    write_node_meta(&group, &node_meta(&meta))?;
                    group
                };

                let mut count: usize = 0;
                let entries = match std::fs::read_dir(path) {
                    Ok(entries) => entries,
                    Err(err) => {
                        log::warn!("cannot read directory {}: {}", path.display(), err);
                        return Ok(0);
                    }
                };
                for entry in entries {
                    let entry: std::fs::DirEntry = match entry {
                        Ok(entry) => entry,
                        Err(err) => {
                            log::warn!("cannot read entry in {}: {}", path.display(), err);
                            continue;
                        }
                    };
                    count += self.coalesce(level + 1, base, &entry.path(), &group)?;
                }

                if count == 0 && !existing && !self.opts.allow_empty_dirs {
                    log::info!("{}removing group {} as empty", indent, name);
                    parent.unlink(&name)?;
                }
                Ok(count)
            }
        }
    }

    /// Write one source file as a 1-D `u8` dataset with metadata attributes.
    ///
    /// The dataset is contiguous and written through hyperslab selections of
    /// at most the configured chunk size, hashing as it streams. Empty files
    /// skip the stream and receive the canonical empty digest.
    fn store_file(&self, group: &Group, source: &Path, name: &str) -> Result<(), PackError> {
        // Follows symlinks: an inlined external symlink stores target bytes
        let meta: Metadata =
            std::fs::metadata(source).map_err(|e| PackError::source_io(source, e))?;
        let size: u64 = meta.len();

        if group.link_exists(name) {
            group.unlink(name)?;
        }

        let ds: Dataset = group
            .new_dataset::<u8>()
            .shape(size as usize)
            .create(name)?;

        if size == 0 {
            write_md5_attr(&ds, EMPTY_MD5)?;
            write_node_meta(&ds, &node_meta(&meta))?;
            return Ok(());
        }

        match self.stream_into(&ds, source, size) {
            Ok(digest) => {
                write_md5_attr(&ds, &digest)?;
                write_node_meta(&ds, &node_meta(&meta))?;
                Ok(())
            }
            Err(err) => {
                // Don't leave a half-written dataset behind
                drop(ds);
                if let Err(unlink_err) = group.unlink(name) {
                    log::warn!("cannot remove partial dataset {}: {}", name, unlink_err);
                }
                Err(err)
            }
        }
    }

    fn stream_into(&self, ds: &Dataset, source: &Path, size: u64) -> Result<String, PackError> {
        let mut file: std::fs::File =
            std::fs::File::open(source).map_err(|e| PackError::source_io(source, e))?;
        let chunk: u64 = self.opts.chunk_size.min(size).max(1);
        let mut buffer: Vec<u8> = vec![0u8; chunk as usize];
        let mut hasher: Md5Hasher = Md5Hasher::new();

        let mut offset: usize = 0;
        let total: usize = size as usize;
        while offset < total {
            let count: usize = (chunk as usize).min(total - offset);
            file.read_exact(&mut buffer[..count])
                .map_err(|e| PackError::source_io(source, e))?;
            hasher.update(&buffer[..count]);
            ds.write_slice(&buffer[..count], s![offset..offset + count])?;
            offset += count;
        }

        Ok(hasher.finish_hex())
    }

    fn compose_soft_target(&self, base: &Path, target: LinkTarget) -> Result<String, PackError> {
        match target {
            LinkTarget::Source(path) => Ok(archive_link_path(base, &path)?),
            LinkTarget::Archive(path) => Ok(path),
        }
    }

    fn soft_link(&self, target: &str, dest: &str) -> Result<(), PackError> {
        if self.archive.link_exists(dest) {
            self.archive.unlink(dest)?;
        }
        self.archive.link_soft(target, dest)?;
        Ok(())
    }

    /// Create a hard link, deferring it when the source is not yet written.
    fn hard_link(&mut self, source: String, dest: String) -> Result<(), PackError> {
        if self.archive.link_exists(&dest) {
            self.archive.unlink(&dest)?;
        }
        if !self.archive.link_exists(&source) {
            self.deferred.push(DeferredLink { source, dest });
            return Ok(());
        }
        self.archive.link_hard(&source, &dest)?;
        Ok(())
    }

    /// Model an out-of-archive symlink: a group carrying the target path in
    /// its `ExternalLink` attribute.
    fn external_link(&self, group: &Group, name: &str, target: &str) -> Result<(), PackError> {
        if group.link_exists(name) {
            group.unlink(name)?;
        }
        let link_group: Group = group.create_group(name)?;
        write_string_attr(&link_group, ATTR_EXTERNAL_LINK, target)?;
        Ok(())
    }

    /// Drain the deferred-link queue in insertion order. Entries whose
    /// source still does not exist produce a diagnostic and are discarded.
    pub fn resolve_deferred(&mut self) {
        for link in self.deferred.drain(..) {
            if !self.archive.link_exists(&link.source) {
                log::warn!(
                    "failed to link {} to {}: source does not exist",
                    link.source,
                    link.dest
                );
                continue;
            }
            if let Err(err) = self.archive.link_hard(&link.source, &link.dest) {
                log::warn!("failed to link {} to {}: {}", link.source, link.dest, err);
            }
        }
    }

    /// Number of hard links still waiting for their source.
    pub fn pending_links(&self) -> usize {
        self.deferred.len()
    }
}

fn node_meta(meta: &Metadata) -> NodeMeta {
    NodeMeta {
        created: meta.ctime(),
        modified: meta.mtime(),
        permissions: meta.mode(),
    }
}

/// Open the output archive read-write, or create and initialize it.
///
/// A freshly created archive is stamped with the `H5VFS` version mark and a
/// creation timestamp. When appending, every input root must either already
/// exist as a top-level group or `new_roots` must be set.
///
/// # Arguments
/// * `output` - Archive path
/// * `roots` - Absolute source roots for this run
/// * `new_roots` - Permit introducing new top-level groups
pub fn open_or_create_archive(
    output: &Path,
    roots: &[PathBuf],
    new_roots: bool,
) -> Result<File, PackError> {
    if let Ok(file) = File::open_rw(output) {
        for root in roots {
            let name: String = last_path_chunk(root);
            if !file.link_exists(&name) && !new_roots {
                return Err(PackError::Config(format!(
                    "extending {} with new root group \"{}\" requires --newroots",
                    output.display(),
                    name
                )));
            }
        }
        log::info!("appending to {}", output.display());
        return Ok(file);
    }

    let file: File = File::create(output)?;
    write_string_attr(&file, ATTR_FORMAT_MARK, env!("CARGO_PKG_VERSION"))?;
    let now: i64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    file.new_attr::<i64>()
        .create(ATTR_CREATED)?
        .write_scalar(&now)?;
    log::info!("creating new archive {}", output.display());
    Ok(file)
}
