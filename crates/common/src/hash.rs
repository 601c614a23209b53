//! MD5 computation utilities.

use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

/// Render an MD5 digest as a 32-character lowercase hex string.
fn digest_hex(digest: &[u8]) -> String {
    let mut hex: String = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Compute the MD5 hash of a byte slice.
///
/// # Arguments
/// * `data` - Bytes to hash
///
/// # Returns
/// 32-character lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher: Md5 = Md5::new();
    hasher.update(data);
    digest_hex(&hasher.finalize())
}

/// Compute the MD5 hash of a file, reading it in fixed-size chunks.
///
/// Bytes are consumed in strictly increasing file offset, `chunk_size` bytes
/// at a time, with a final short chunk if the file length is not a multiple
/// of `chunk_size`.
///
/// # Arguments
/// * `path` - Path to the file to hash
/// * `chunk_size` - Read granularity in bytes (must be non-zero)
///
/// # Returns
/// 32-character lowercase hex string.
///
/// # Errors
/// Returns error if file cannot be read.
pub fn hash_file_chunked(path: &Path, chunk_size: u64) -> Result<String, std::io::Error> {
    let size: u64 = std::fs::metadata(path)?.len();
    let mut file: std::fs::File = std::fs::File::open(path)?;
    let mut hasher: Md5Hasher = Md5Hasher::new();
    let mut buffer: Vec<u8> = vec![0u8; chunk_size.min(size).max(1) as usize];

    let mut offset: u64 = 0;
    while offset < size {
        let count: usize = chunk_size.min(size - offset) as usize;
        file.read_exact(&mut buffer[..count])?;
        hasher.update(&buffer[..count]);
        offset += count as u64;
    }

    Ok(hasher.finish_hex())
}

/// Streaming hasher for incremental MD5 computation.
///
/// Use this when hashing data that arrives in pieces, such as when a file is
/// being hashed while its bytes are written elsewhere.
pub struct Md5Hasher {
    inner: Md5,
}

impl Md5Hasher {
    /// Create a new streaming hasher.
    pub fn new() -> Self {
        Self { inner: Md5::new() }
    }

    /// Update the hasher with additional data.
    ///
    /// # Arguments
    /// * `data` - Bytes to add to the hash computation
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the hash as a 32-char hex string.
    pub fn finish_hex(self) -> String {
        digest_hex(&self.inner.finalize())
    }
}

impl Default for Md5Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hash_bytes_empty() {
        assert_eq!(hash_bytes(b""), crate::constants::EMPTY_MD5);
    }

    #[test]
    fn test_hash_bytes_known_vector() {
        // RFC 1321 test vector
        assert_eq!(hash_bytes(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_hasher_incremental_matches_oneshot() {
        let mut hasher: Md5Hasher = Md5Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finish_hex(), hash_bytes(b"hello world"));
    }

    #[test]
    fn test_hash_file_chunked() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let file_path: std::path::PathBuf = dir.path().join("test.bin");

        let data: Vec<u8> = (0u32..10_000).flat_map(|i: u32| i.to_le_bytes()).collect();
        let mut file: std::fs::File = std::fs::File::create(&file_path).unwrap();
        file.write_all(&data).unwrap();
        drop(file);

        // A chunk size that does not divide the file length exercises the
        // final short chunk.
        let chunked: String = hash_file_chunked(&file_path, 1000).unwrap();
        assert_eq!(chunked, hash_bytes(&data));
    }

    #[test]
    fn test_hash_file_chunked_empty() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let file_path: std::path::PathBuf = dir.path().join("empty");
        std::fs::File::create(&file_path).unwrap();

        let hash: String = hash_file_chunked(&file_path, 4096).unwrap();
        assert_eq!(hash, crate::constants::EMPTY_MD5);
    }

    #[test]
    fn test_hash_file_not_found() {
        let result: Result<String, std::io::Error> =
            hash_file_chunked(Path::new("/nonexistent/file.bin"), 4096);
        assert!(result.is_err());
    }
}
