//! MD5 content digests
//!
//! MD5 is used purely as a content-identity key for matching files across
//! inventories, not for integrity against an adversary.

use md5::{Digest, Md5};
use std::io::{self, Read};

/// Default bytes fed to the accumulator per update
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Digest an in-memory buffer in `chunk_size` pieces
///
/// Returns 32 lowercase hex characters.
///
/// # Example
///
/// ```
/// use ftp_inventory::hasher::digest::md5_hex;
///
/// assert_eq!(md5_hex(b"", 8192), "d41d8cd98f00b204e9800998ecf8427e");
/// ```
pub fn md5_hex(content: &[u8], chunk_size: usize) -> String {
    let mut hasher = Md5::new();
    for chunk in content.chunks(chunk_size.max(1)) {
        hasher.update(chunk);
    }
    to_hex(&hasher.finalize())
}

/// Digest everything a reader yields, reading `chunk_size` bytes at a time
pub fn md5_reader<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<(String, u64)> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    Ok((to_hex(&hasher.finalize()), total))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_known_digests() {
        assert_eq!(md5_hex(b"", 8192), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            md5_hex(b"The quick brown fox jumps over the lazy dog", 8192),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_chunk_size_does_not_change_digest() {
        let data = vec![0xABu8; 100_000];
        let whole = md5_hex(&data, data.len());
        assert_eq!(md5_hex(&data, 7), whole);
        assert_eq!(md5_hex(&data, DEFAULT_CHUNK_SIZE), whole);
    }

    #[test]
    fn test_reader_matches_buffer() {
        let data = b"Hello, World!".repeat(1000);
        let (hex, total) = md5_reader(Cursor::new(&data), 100).unwrap();
        assert_eq!(hex, md5_hex(&data, 8192));
        assert_eq!(total, data.len() as u64);
    }
}
