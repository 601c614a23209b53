//! Translation of mount-relative POSIX paths into archive objects.
//!
//! A path classifies as exactly one of: generic dot directory, dataset,
//! group, soft link, external-link group, attribute-as-file, or absent.
//! Attribute-as-file surfacing is decided once at mount time from the root
//! `H5VFS` attribute and never changes afterwards.

use hdf5::{Attribute, File, Group};

use h5vfs_archive::{
    attr_byte_len, dataset_byte_len, link_kind, read_i64_attr, read_string_attr, read_u32_attr,
    soft_link_target, ATTR_CREATED, ATTR_EXTERNAL_LINK, ATTR_FILE_TOKEN, ATTR_FORMAT_MARK,
    ATTR_MODIFIED, ATTR_PERMISSIONS, LinkKind,
};

use crate::error::VfsError;

/// Optional metadata attributes of a group or dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileMeta {
    /// `Created` attribute, epoch seconds.
    pub created: Option<i64>,
    /// `Modified` attribute, epoch seconds.
    pub modified: Option<i64>,
    /// `Permissions` attribute, source `st_mode`.
    pub permissions: Option<u32>,
}

/// What a mount-relative path resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A group, or a generic `.`/`..` entry.
    Dir {
        /// Metadata attributes, all absent for dot entries.
        meta: FileMeta,
    },
    /// A dataset.
    File {
        /// Byte length (element count times element size).
        size: u64,
        /// Metadata attributes.
        meta: FileMeta,
    },
    /// An intra-archive soft link.
    SoftLink {
        /// Archive-absolute target path as stored.
        target: String,
        /// Byte length of the target dataset, 0 for group targets.
        size: u64,
    },
    /// A group carrying an `ExternalLink` attribute.
    ExternalLink {
        /// Host filesystem target path as stored.
        target: String,
        /// Byte length of the host target, 0 if it cannot be inspected.
        size: u64,
    },
    /// A synthetic `.<name>.attr.<attr>` file.
    AttrFile {
        /// Byte length of the attribute value.
        size: u64,
    },
}

/// Directory entry kind reported by `list_dir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Group.
    Directory,
    /// Dataset or synthetic attribute file.
    File,
    /// Soft link or external-link group.
    Symlink,
}

/// Parent of an archive-absolute path (`/a/b` -> `/a`, `/a` -> `/`).
pub fn parent_path(path: &str) -> String {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => path[..pos].to_string(),
    }
}

/// Last component of an archive-absolute path.
pub fn last_component(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Join a child name onto an archive-absolute path.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Resolves mount-relative paths against one open archive.
pub struct Resolver<'f> {
    file: &'f File,
    surface_attrs: bool,
}

impl<'f> Resolver<'f> {
    /// Create a resolver.
    ///
    /// # Arguments
    /// * `file` - Open archive
    /// * `surface_attrs` - Whether attribute-as-file names resolve
    pub fn new(file: &'f File, surface_attrs: bool) -> Self {
        Self {
            file,
            surface_attrs,
        }
    }

    /// Whether attributes should be surfaced as files for this archive.
    ///
    /// Archives stamped with the root `H5VFS` mark were produced by the
    /// packer; their attributes are internal metadata and stay hidden.
    pub fn surfacing_enabled(file: &File) -> bool {
        file.attr(ATTR_FORMAT_MARK).is_err()
    }

    /// Classify a mount-relative path.
    ///
    /// # Returns
    /// `None` when the path names nothing (ENOENT).
    pub fn resolve(&self, path: &str) -> Result<Option<Node>, VfsError> {
        if path == "/" || path.is_empty() {
            return self.resolve_object("/");
        }
        let name: &str = last_component(path);
        if name == "." || name == ".." {
            return Ok(Some(Node::Dir {
                meta: FileMeta::default(),
            }));
        }

        if !self.file.link_exists(path) {
            // Not a real name; it may still be an attribute-as-file
            if self.surface_attrs {
                if let Some(attr) = self.attr_for_path(path) {
                    let size: u64 = attr_byte_len(&attr)?;
                    return Ok(Some(Node::AttrFile { size }));
                }
            }
            return Ok(None);
        }

        if link_kind(self.file, path)? == Some(LinkKind::Soft) {
            return self.resolve_soft_link(path);
        }

        self.resolve_object(path)
    }

    /// Classify a path known to name an object (group or dataset).
    fn resolve_object(&self, path: &str) -> Result<Option<Node>, VfsError> {
        if let Ok(group) = self.file.group(path) {
            if let Some(target) = read_string_attr(&group, ATTR_EXTERNAL_LINK)? {
                let size: u64 = std::fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
                return Ok(Some(Node::ExternalLink { target, size }));
            }
            return Ok(Some(Node::Dir {
                meta: read_meta(&group),
            }));
        }
        if let Ok(ds) = self.file.dataset(path) {
            let size: u64 = dataset_byte_len(&ds)?;
            return Ok(Some(Node::File {
                size,
                meta: read_meta(&ds),
            }));
        }
        Ok(None)
    }

    /// Classify a soft link, sizing it through its target.
    fn resolve_soft_link(&self, path: &str) -> Result<Option<Node>, VfsError> {
        let target: String = match soft_link_target(self.file, path)? {
            Some(target) => target,
            None => return Ok(None),
        };

        // Opening the target resolves chained links; a dangling link is
        // treated as absent.
        if self.file.group(&target).is_ok() {
            return Ok(Some(Node::SoftLink { target, size: 0 }));
        }
        if let Ok(ds) = self.file.dataset(&target) {
            let size: u64 = dataset_byte_len(&ds)?;
            return Ok(Some(Node::SoftLink { target, size }));
        }
        Ok(None)
    }

    /// Look up the attribute behind a `<prefix>/.<parent>.attr.<attr>` name.
    ///
    /// Returns `None` unless the prefix is a group, the parent exists inside
    /// it, and the attribute exists on the parent.
    pub fn attr_for_path(&self, path: &str) -> Option<Attribute> {
        let prefix: String = parent_path(path);
        let last: &str = last_component(path);

        let stripped: &str = last.strip_prefix('.')?;
        let pos: usize = stripped.find(ATTR_FILE_TOKEN)?;
        let parent: &str = &stripped[..pos];
        let attr_name: &str = &stripped[pos + ATTR_FILE_TOKEN.len()..];
        if parent.is_empty() || attr_name.is_empty() {
            return None;
        }

        let group: Group = self.file.group(&prefix).ok()?;
        if !group.link_exists(parent) {
            return None;
        }
        if let Ok(child) = group.group(parent) {
            return child.attr(attr_name).ok();
        }
        if let Ok(child) = group.dataset(parent) {
            return child.attr(attr_name).ok();
        }
        None
    }

    /// List a directory's entries in on-disk order, including synthetic
    /// attribute files when surfacing is enabled.
    pub fn list_dir(&self, path: &str) -> Result<Vec<(String, EntryKind)>, VfsError> {
        if !(path == "/" || self.file.link_exists(path)) {
            return Err(VfsError::NotFound(path.to_string()));
        }
        let group: Group = self
            .file
            .group(path)
            .map_err(|_| VfsError::NotADirectory(path.to_string()))?;

        let mut entries: Vec<(String, EntryKind)> = Vec::new();
        for name in group.member_names()? {
            let member: String = child_path(path, &name);

            if link_kind(self.file, &member)? == Some(LinkKind::Soft) {
                entries.push((name, EntryKind::Symlink));
                continue;
            }

            if let Ok(child) = group.group(&name) {
                if read_string_attr(&child, ATTR_EXTERNAL_LINK)?.is_some() {
                    entries.push((name, EntryKind::Symlink));
                    continue;
                }
                entries.push((name.clone(), EntryKind::Directory));
                if self.surface_attrs {
                    push_attr_entries(&mut entries, &name, child.attr_names()?);
                }
            } else if let Ok(child) = group.dataset(&name) {
                entries.push((name.clone(), EntryKind::File));
                if self.surface_attrs {
                    push_attr_entries(&mut entries, &name, child.attr_names()?);
                }
            } else {
                // Unresolvable members (dangling links) still get listed
                entries.push((name, EntryKind::File));
            }
        }
        Ok(entries)
    }
}

/// Read the optional metadata attributes of a group or dataset.
fn read_meta(loc: &hdf5::Location) -> FileMeta {
    FileMeta {
        created: read_i64_attr(loc, ATTR_CREATED),
        modified: read_i64_attr(loc, ATTR_MODIFIED),
        permissions: read_u32_attr(loc, ATTR_PERMISSIONS),
    }
}

fn push_attr_entries(entries: &mut Vec<(String, EntryKind)>, name: &str, attrs: Vec<String>) {
    for attr in attrs {
        entries.push((
            format!(".{}{}{}", name, ATTR_FILE_TOKEN, attr),
            EntryKind::File,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/a/b/c"), "/a/b");
        assert_eq!(parent_path("/a"), "/");
        assert_eq!(parent_path("/"), "/");
    }

    #[test]
    fn test_last_component() {
        assert_eq!(last_component("/a/b/c"), "c");
        assert_eq!(last_component("/a"), "a");
        assert_eq!(last_component("/a/b/"), "b");
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path("/", "a"), "/a");
        assert_eq!(child_path("/a", "b"), "/a/b");
    }
}
