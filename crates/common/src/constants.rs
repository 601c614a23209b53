//! Shared constants used across the h5vfs crates.

/// Default write/read chunk size for streaming file bytes (10 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// MD5 digest of the empty byte sequence, lowercase hex.
/// Empty files are stamped with this without entering the hashing loop.
pub const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// Length of an MD5 digest rendered as lowercase hex.
pub const MD5_HEX_LEN: usize = 32;
