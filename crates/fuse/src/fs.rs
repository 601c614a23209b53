//! FUSE adapter over the path resolver and the open-file table.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, Request, FUSE_ROOT_ID,
};
use hdf5::File;

use h5vfs_archive::read_attr_bytes;

use crate::resolver::{child_path, parent_path, EntryKind, Node, Resolver};
use crate::table::OpenFileTable;

/// TTL for FUSE attributes. The archive is immutable while mounted, but a
/// short timeout keeps behavior sane if the file is swapped underneath.
const TTL: Duration = Duration::from_secs(1);

/// Maps kernel inode numbers onto mount-relative paths.
///
/// Inodes are handed out lazily as paths are first seen in `lookup` or
/// `readdir` and stay stable for the lifetime of the mount.
struct InodeTable {
    paths: HashMap<u64, String>,
    ids: HashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut table: InodeTable = Self {
            paths: HashMap::new(),
            ids: HashMap::new(),
            next: FUSE_ROOT_ID + 1,
        };
        table.paths.insert(FUSE_ROOT_ID, "/".to_string());
        table.ids.insert("/".to_string(), FUSE_ROOT_ID);
        table
    }

    fn assign(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.ids.get(path) {
            return ino;
        }
        let ino: u64 = self.next;
        self.next += 1;
        self.ids.insert(path.to_string(), ino);
        self.paths.insert(ino, path.to_string());
        ino
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.paths.get(&ino).cloned()
    }
}

/// Everything the callbacks touch, guarded by one mutex.
struct VfsState {
    archive: File,
    container_path: PathBuf,
    mount_point: PathBuf,
    /// mtime of the container file; default for ctime/mtime of nodes
    /// without their own attributes.
    archive_mtime: i64,
    /// Fixed at mount time from the root `H5VFS` attribute.
    surface_attrs: bool,
    inodes: InodeTable,
    open_files: OpenFileTable,
}

/// Read-only FUSE filesystem over one HDF5 archive.
///
/// All state is serialized behind a single mutex taken at every callback
/// entry; the helpers below require the lock held and never re-acquire it.
pub struct H5Vfs {
    state: Mutex<VfsState>,
}

impl H5Vfs {
    /// Create a filesystem over an open archive.
    ///
    /// # Arguments
    /// * `archive` - Archive opened read-only
    /// * `container_path` - Host path of the archive file (for raw reads)
    /// * `mount_point` - Absolute mount point (for readlink composition)
    pub fn new(archive: File, container_path: PathBuf, mount_point: PathBuf) -> Self {
        let archive_mtime: i64 = std::fs::metadata(&container_path)
            .map(|m| m.mtime())
            .unwrap_or(0);
        let surface_attrs: bool = Resolver::surfacing_enabled(&archive);

        Self {
            state: Mutex::new(VfsState {
                archive,
                container_path,
                mount_point,
                archive_mtime,
                surface_attrs,
                inodes: InodeTable::new(),
                open_files: OpenFileTable::new(),
            }),
        }
    }

    /// Whether this mount surfaces attributes as hidden files.
    pub fn surfaces_attributes(&self) -> bool {
        self.state.lock().unwrap().surface_attrs
    }
}

/// Build the stat reply for a resolved node.
fn node_attr(ino: u64, node: &Node, default_time: i64) -> FileAttr {
    let (kind, size, perm, nlink, meta) = match node {
        Node::Dir { meta } => (FileType::Directory, 0u64, 0o755u16, 2u32, Some(meta)),
        Node::File { size, meta } => (FileType::RegularFile, *size, 0o444, 1, Some(meta)),
        Node::SoftLink { size, .. } => (FileType::Symlink, *size, 0o777, 1, None),
        Node::ExternalLink { size, .. } => (FileType::Symlink, *size, 0o777, 1, None),
        Node::AttrFile { size } => (FileType::RegularFile, *size, 0o444, 1, None),
    };

    // Permissions attribute overrides the default mode bits; the file type
    // always comes from the node kind.
    let perm: u16 = meta
        .and_then(|m| m.permissions)
        .map(|mode: u32| (mode & 0o7777) as u16)
        .unwrap_or(perm);
    let ctime: i64 = meta.and_then(|m| m.created).unwrap_or(default_time);
    let mtime: i64 = meta.and_then(|m| m.modified).unwrap_or(default_time);

    FileAttr {
        ino,
        size,
        blocks: (size + 511) / 512,
        atime: epoch_time(mtime),
        mtime: epoch_time(mtime),
        ctime: epoch_time(ctime),
        crtime: UNIX_EPOCH,
        kind,
        perm,
        nlink,
        uid: unsafe { libc::getuid() },
        gid: unsafe { libc::getgid() },
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn epoch_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::File => FileType::RegularFile,
        EntryKind::Symlink => FileType::Symlink,
    }
}

impl Filesystem for H5Vfs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let mut guard = self.state.lock().unwrap();
        let state: &mut VfsState = &mut guard;

        let name_str: &str = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let parent_path: String = match state.inodes.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let path: String = child_path(&parent_path, name_str);

        let resolver: Resolver = Resolver::new(&state.archive, state.surface_attrs);
        match resolver.resolve(&path) {
            Ok(Some(node)) => {
                let ino: u64 = state.inodes.assign(&path);
                reply.entry(&TTL, &node_attr(ino, &node, state.archive_mtime), 0);
            }
            Ok(None) => reply.error(libc::ENOENT),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        let mut guard = self.state.lock().unwrap();
        let state: &mut VfsState = &mut guard;

        let path: String = match state.inodes.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        let resolver: Resolver = Resolver::new(&state.archive, state.surface_attrs);
        match resolver.resolve(&path) {
            Ok(Some(node)) => reply.attr(&TTL, &node_attr(ino, &node, state.archive_mtime)),
            Ok(None) => reply.error(libc::ENOENT),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let mut guard = self.state.lock().unwrap();
        let state: &mut VfsState = &mut guard;

        let path: String = match state.inodes.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        let resolver: Resolver = Resolver::new(&state.archive, state.surface_attrs);
        let children: Vec<(String, EntryKind)> = match resolver.list_dir(&path) {
            Ok(children) => children,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        let parent_ino: u64 = state.inodes.assign(&parent_path(&path));
        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for (name, kind) in children {
            let member: String = child_path(&path, &name);
            let member_ino: u64 = state.inodes.assign(&member);
            entries.push((member_ino, file_type(kind), name));
        }

        for (i, (e_ino, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            if reply.add(*e_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let mut guard = self.state.lock().unwrap();
        let state: &mut VfsState = &mut guard;

        let path: String = match state.inodes.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        let resolver: Resolver = Resolver::new(&state.archive, state.surface_attrs);
        let target: String = match resolver.resolve(&path) {
            // External links return the stored host path verbatim
            Ok(Some(Node::ExternalLink { target, .. })) => target,
            // Soft links are archive-absolute; rebase onto the mount point
            Ok(Some(Node::SoftLink { target, .. })) => {
                format!("{}{}", state.mount_point.display(), target)
            }
            Ok(_) => {
                reply.error(libc::ENOENT);
                return;
            }
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };

        if target.len() >= libc::PATH_MAX as usize {
            reply.error(libc::ENAMETOOLONG);
            return;
        }
        reply.data(target.as_bytes());
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let mut guard = self.state.lock().unwrap();
        let state: &mut VfsState = &mut guard;

        let path: String = match state.inodes.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        let resolver: Resolver = Resolver::new(&state.archive, state.surface_attrs);
        match resolver.resolve(&path) {
            Ok(Some(Node::File { .. })) => {
                match state.open_files.open(&state.archive, &path) {
                    Ok(()) => reply.opened(0, 0),
                    Err(err) => reply.error(err.errno()),
                }
            }
            // Attribute-as-file opens allocate no handle
            Ok(Some(Node::AttrFile { .. })) => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOENT),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        let mut guard = self.state.lock().unwrap();
        let state: &mut VfsState = &mut guard;

        let path: String = match state.inodes.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let offset: u64 = offset.max(0) as u64;

        if state.open_files.contains(&path) {
            let VfsState {
                open_files,
                container_path,
                ..
            } = state;
            match open_files.read(container_path, &path, offset, size) {
                Ok(data) => reply.data(&data),
                Err(err) => reply.error(err.errno()),
            }
            return;
        }

        // No handle: the path may be an attribute-as-file
        if state.surface_attrs {
            let resolver: Resolver = Resolver::new(&state.archive, state.surface_attrs);
            if let Some(attr) = resolver.attr_for_path(&path) {
                let bytes: Vec<u8> = match read_attr_bytes(&attr) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        reply.error(crate::error::VfsError::from(err).errno());
                        return;
                    }
                };
                let len: u64 = bytes.len() as u64;
                if offset >= len {
                    reply.data(&[]);
                    return;
                }
                let end: usize = ((offset + size as u64).min(len)) as usize;
                reply.data(&bytes[offset as usize..end]);
                return;
            }
        }

        reply.error(libc::ENOENT);
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let mut guard = self.state.lock().unwrap();
        let state: &mut VfsState = &mut guard;

        let path: String = match state.inodes.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match state.open_files.release(&path) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }
}
