//! Path handling for the packer: walk-root normalization, containment
//! checks for symlink targets, and archive link-path composition.
//!
//! Everything here reduces host paths to the flat component lists the
//! archive cares about. Archive paths are plain `/`-separated strings with
//! no `.` or `..` segments, so the reduction happens once, up front, and
//! the rest of the tree works on the reduced form.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Reduce a host path to the ordered component names below `/`.
///
/// Relative paths are anchored at the working directory first. `.` segments
/// vanish, `..` folds into its parent, and `..` at the root stays at the
/// root, the way the kernel walks an absolute path.
fn reduce_components(path: &Path) -> Result<Vec<OsString>, PathError> {
    let anchored: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd: PathBuf = std::env::current_dir().map_err(|e: std::io::Error| {
            PathError::WorkingDir {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        })?;
        cwd.join(path)
    };

    let mut names: Vec<OsString> = Vec::new();
    for component in anchored.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => names.clear(),
            Component::CurDir => {}
            Component::ParentDir => {
                names.pop();
            }
            Component::Normal(name) => names.push(name.to_os_string()),
        }
    }
    Ok(names)
}

/// Normalize a walk root given on the command line.
///
/// The result is absolute with `.` and `..` folded away; link-path
/// composition during the walk is relative to this form.
///
/// # Arguments
/// * `path` - Directory as the user wrote it
///
/// # Errors
/// Returns error if a relative path cannot be anchored at the working
/// directory.
pub fn normalize_root(path: &Path) -> Result<PathBuf, PathError> {
    let mut root: PathBuf = PathBuf::from("/");
    for name in reduce_components(path)? {
        root.push(name);
    }
    Ok(root)
}

/// Whether a symlink target stays inside the base directory being packed.
///
/// Both sides are reduced before comparison, so `..` segments cannot smuggle
/// a target out of the base. Purely lexical; symlinks along the way are not
/// chased.
///
/// # Arguments
/// * `target` - Resolved symlink target
/// * `base` - Base directory of the walk
pub fn is_under_base(target: &Path, base: &Path) -> bool {
    match (reduce_components(target), reduce_components(base)) {
        (Ok(target), Ok(base)) => {
            target.len() >= base.len() && target[..base.len()] == base[..]
        }
        _ => false,
    }
}

/// Last component of a path, as a string.
///
/// # Arguments
/// * `path` - Path to take the final component of
pub fn last_path_chunk(path: &Path) -> String {
    path.file_name()
        .map(|name: &std::ffi::OsStr| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Compose the archive-absolute path for an intra-archive link target.
///
/// The base directory's own name becomes the first segment (it names the
/// top-level group), followed by the target's components below the base.
/// Archive paths always begin with `/` and use `/` separators regardless of
/// host convention.
///
/// # Arguments
/// * `base` - Base directory of the walk
/// * `target` - Filesystem path of the link target
///
/// # Errors
/// Returns error if `target` does not lie under `base`, or if `base` is the
/// filesystem root and so has no name to head the path with.
pub fn archive_link_path(base: &Path, target: &Path) -> Result<String, PathError> {
    let base_names: Vec<OsString> = reduce_components(base)?;
    let target_names: Vec<OsString> = reduce_components(target)?;

    let root_name: &OsString = base_names.last().ok_or_else(|| PathError::UnnamedBase {
        base: base.display().to_string(),
    })?;
    if target_names.len() < base_names.len() || target_names[..base_names.len()] != base_names[..]
    {
        return Err(PathError::TargetOutsideBase {
            target: target.display().to_string(),
            base: base.display().to_string(),
        });
    }

    let mut link: String = String::from("/");
    link.push_str(&root_name.to_string_lossy());
    for name in &target_names[base_names.len()..] {
        link.push('/');
        link.push_str(&name.to_string_lossy());
    }
    Ok(link)
}
