//! Shared types and utilities for the h5vfs tools.
//!
//! This crate provides common functionality used by both the packer and the
//! FUSE adapter:
//! - Walk-root normalization and archive link-path composition
//! - MD5 computation (streaming and chunked-file)
//! - Shared constants and error types

pub mod constants;
pub mod error;
pub mod hash;
pub mod path_utils;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::PathError;
pub use hash::{hash_bytes, hash_file_chunked, Md5Hasher};
pub use path_utils::{archive_link_path, is_under_base, last_path_chunk, normalize_root};
