//! Error types for the FUSE adapter.

use std::fmt;

/// Errors that can occur during VFS operations.
///
/// Every error maps onto the POSIX error number handed back to the FUSE
/// host; a failed call never takes the process down.
#[derive(Debug)]
pub enum VfsError {
    /// Path does not name anything in the archive.
    NotFound(String),

    /// Path names something that is not a directory.
    NotADirectory(String),

    /// A readlink result does not fit the caller's buffer.
    NameTooLong,

    /// Archive schema failure.
    Archive(h5vfs_archive::ArchiveError),

    /// Container library failure.
    Container(hdf5::Error),

    /// Host filesystem failure (container file reads).
    Io(std::io::Error),

    /// Mount operation failed.
    MountFailed(String),
}

impl VfsError {
    /// POSIX error number reported to the FUSE host.
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::NotFound(_) => libc::ENOENT,
            VfsError::NotADirectory(_) => libc::ENOTDIR,
            VfsError::NameTooLong => libc::ENAMETOOLONG,
            VfsError::Archive(_) | VfsError::Container(_) | VfsError::Io(_) => libc::EIO,
            VfsError::MountFailed(_) => libc::EIO,
        }
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::NotFound(path) => write!(f, "Not found: {}", path),
            VfsError::NotADirectory(path) => write!(f, "Not a directory: {}", path),
            VfsError::NameTooLong => write!(f, "Link target too long"),
            VfsError::Archive(err) => write!(f, "Archive error: {}", err),
            VfsError::Container(err) => write!(f, "Container error: {}", err),
            VfsError::Io(err) => write!(f, "IO error: {}", err),
            VfsError::MountFailed(msg) => write!(f, "Mount failed: {}", msg),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::Archive(err) => Some(err),
            VfsError::Container(err) => Some(err),
            VfsError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<h5vfs_archive::ArchiveError> for VfsError {
    fn from(err: h5vfs_archive::ArchiveError) -> Self {
        Self::Archive(err)
    }
}

impl From<hdf5::Error> for VfsError {
    fn from(err: hdf5::Error) -> Self {
        Self::Container(err)
    }
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
