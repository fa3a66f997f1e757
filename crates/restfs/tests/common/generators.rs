//! Test data generators for restfs integration tests.

use rand::Rng;

/// Chunk size used for multi-chunk content (64KB, the copy chunk size).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Generate random bytes of specified size.
pub fn random_bytes(size: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random()).collect()
}

/// Generate content that spans exactly N chunks.
pub fn multi_chunk_content(chunks: usize) -> Vec<u8> {
    random_bytes(chunks * CHUNK_SIZE)
}

/// Generate content containing all 256 possible byte values.
pub fn all_byte_values() -> Vec<u8> {
    (0u8..=255).collect()
}

/// Generate a filename with special characters.
pub fn special_filename() -> String {
    "file with spaces & (special) chars!.txt".to_string()
}

/// Generate a deep nested path like "dir0/dir1/dir2".
pub fn deep_path(depth: usize) -> String {
    (0..depth)
        .map(|i| format!("dir{i}"))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_length() {
        assert_eq!(random_bytes(100).len(), 100);
        assert_eq!(random_bytes(0).len(), 0);
        assert_eq!(multi_chunk_content(2).len(), 2 * CHUNK_SIZE);
    }

    #[test]
    fn test_deep_path() {
        assert_eq!(deep_path(0), "");
        assert_eq!(deep_path(3), "dir0/dir1/dir2");
    }
}
