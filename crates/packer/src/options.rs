//! Packer configuration: filter lists, update and symlink policies.

use regex::Regex;

use h5vfs_common::DEFAULT_CHUNK_SIZE;

use crate::error::PackError;

/// Policy applied when a destination name already exists in the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum UpdatePolicy {
    /// Keep the stored copy.
    #[default]
    Never,
    /// Rewrite unconditionally.
    Always,
    /// Rewrite when the source byte length differs from the stored length.
    #[value(name = "filesize")]
    FileSize,
    /// Rewrite when the source mtime differs from the stored `Modified`.
    #[value(name = "filetime")]
    FileTime,
    /// Rewrite when the source MD5 differs from the stored `MD5Hash`.
    Hash,
}

/// Policy applied to symlinks whose resolved target lies outside the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExternalSymlinkPolicy {
    /// Omit the entry.
    #[default]
    Ignore,
    /// Follow the link and inline the target bytes.
    File,
    /// Inline the first occurrence of each target, soft-link the rest to it.
    #[value(name = "singlefile")]
    SingleFile,
    /// Record the raw link text as an external link.
    Link,
}

/// Configuration for a packing run.
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// File names must match one of these (empty = accept all).
    pub accept_file: Vec<Regex>,
    /// File names matching any of these are rejected.
    pub reject_file: Vec<Regex>,
    /// Directory names must match one of these (empty = accept all).
    pub accept_dir: Vec<Regex>,
    /// Directory names matching any of these are rejected.
    pub reject_dir: Vec<Regex>,
    /// Update policy for already-present destinations.
    pub update_policy: UpdatePolicy,
    /// Handling of symlinks that resolve outside the base path.
    pub external_symlinks: ExternalSymlinkPolicy,
    /// Write/read chunk size in bytes.
    pub chunk_size: u64,
    /// Keep directories that end up with no stored items.
    pub allow_empty_dirs: bool,
    /// Permit new top-level groups when appending to an existing archive.
    pub new_roots: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            accept_file: Vec::new(),
            reject_file: Vec::new(),
            accept_dir: Vec::new(),
            reject_dir: Vec::new(),
            update_policy: UpdatePolicy::default(),
            external_symlinks: ExternalSymlinkPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            allow_empty_dirs: false,
            new_roots: false,
        }
    }
}

impl PackOptions {
    /// Membership test for file names: at least one accept (or none
    /// configured) and no reject.
    pub fn accepts_file(&self, name: &str) -> bool {
        matches_any(name, &self.accept_file, true) && !matches_any(name, &self.reject_file, false)
    }

    /// Membership test for directory names.
    pub fn accepts_dir(&self, name: &str) -> bool {
        matches_any(name, &self.accept_dir, true) && !matches_any(name, &self.reject_dir, false)
    }
}

/// Check a name against a pattern list. An empty list yields `on_empty`.
fn matches_any(name: &str, patterns: &[Regex], on_empty: bool) -> bool {
    if patterns.is_empty() {
        return on_empty;
    }
    patterns.iter().any(|re: &Regex| re.is_match(name))
}

/// Translate a glob pattern into the equivalent regex.
///
/// `*` becomes `.*`, `?` becomes `.`, `.` is escaped; everything else is
/// passed through.
pub fn glob_to_regex(glob: &str) -> String {
    let mut regex: String = String::with_capacity(glob.len() + 4);
    for ch in glob.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '.' => regex.push_str("\\."),
            _ => regex.push(ch),
        }
    }
    regex
}

/// Compile a pattern list, anchoring each pattern so a match must cover the
/// whole name.
///
/// # Errors
/// Returns error if any pattern is invalid.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, PackError> {
    patterns
        .iter()
        .map(|pattern: &String| {
            Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| PackError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_to_regex() {
        assert_eq!(glob_to_regex("*.txt"), ".*\\.txt");
        assert_eq!(glob_to_regex("file?.bin"), "file.\\.bin");
        assert_eq!(glob_to_regex("plain"), "plain");
    }

    #[test]
    fn test_glob_translation_matches() {
        let patterns: Vec<Regex> = compile_patterns(&[glob_to_regex("*.txt")]).unwrap();
        assert!(matches_any("notes.txt", &patterns, false));
        assert!(!matches_any("notes.txt.bak", &patterns, false));
        assert!(!matches_any("notes_txt", &patterns, false));
    }

    #[test]
    fn test_empty_accept_list_accepts_all() {
        let opts: PackOptions = PackOptions::default();
        assert!(opts.accepts_file("anything"));
        assert!(opts.accepts_dir("anywhere"));
    }

    #[test]
    fn test_accept_list_requires_match() {
        let opts: PackOptions = PackOptions {
            accept_file: compile_patterns(&[glob_to_regex("*.dat")]).unwrap(),
            ..Default::default()
        };
        assert!(opts.accepts_file("run.dat"));
        assert!(!opts.accepts_file("run.log"));
    }

    #[test]
    fn test_reject_list_wins() {
        let opts: PackOptions = PackOptions {
            accept_file: compile_patterns(&[glob_to_regex("*")]).unwrap(),
            reject_file: compile_patterns(&[glob_to_regex("*.tmp")]).unwrap(),
            ..Default::default()
        };
        assert!(opts.accepts_file("keep.txt"));
        assert!(!opts.accepts_file("scratch.tmp"));
    }

    #[test]
    fn test_full_match_semantics() {
        // Patterns match the whole name, not a substring
        let patterns: Vec<Regex> = compile_patterns(&["core".to_string()]).unwrap();
        assert!(matches_any("core", &patterns, false));
        assert!(!matches_any("score", &patterns, false));
        assert!(!matches_any("cores", &patterns, false));
    }

    #[test]
    fn test_invalid_pattern() {
        let result: Result<Vec<Regex>, PackError> = compile_patterns(&["(".to_string()]);
        assert!(matches!(result, Err(PackError::InvalidPattern { .. })));
    }
}
