//! Single-pass computation of the digest pair expected by sidecar files.

use crate::hasher::{Hasher, Md5Hasher, Sha1Hasher};

/// Hex digests of one byte stream, lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestPair {
    pub sha1: String,
    pub md5: String,
}

/// Feeds every chunk of a stream into both sidecar algorithms at once.
///
/// The digester is independent per transfer and must see exactly the
/// bytes that end up in the destination file. [`MultiDigester::reset`]
/// discards all accumulated state, for the case where a server ignores a
/// range request and the transfer restarts from offset zero.
pub struct MultiDigester {
    sha1: Sha1Hasher,
    md5: Md5Hasher,
    bytes_seen: u64,
}

impl MultiDigester {
    pub fn new() -> Self {
        Self {
            sha1: Sha1Hasher::new(),
            md5: Md5Hasher::new(),
            bytes_seen: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.sha1.update(data);
        self.md5.update(data);
        self.bytes_seen += data.len() as u64;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    pub fn finalize(self) -> DigestPair {
        DigestPair {
            sha1: hex::encode(self.sha1.finalize()),
            md5: hex::encode(self.md5.finalize()),
        }
    }
}

impl Default for MultiDigester {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare two hex digests the way sidecar files are compared:
/// surrounding whitespace ignored, case-insensitive.
pub fn hex_eq(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_both_algorithms() {
        let mut digester = MultiDigester::new();
        digester.update(b"HEL");
        digester.update(b"LO");
        assert_eq!(digester.bytes_seen(), 5);

        let pair = digester.finalize();
        assert_eq!(pair.sha1, "c65f99f8c5376adadddc46d5cbcf5762f9e55eb7");
        assert_eq!(pair.md5, "eb61eead90e3b899c6bcbe27ac581660");
    }

    #[test]
    fn reset_discards_state() {
        let mut digester = MultiDigester::new();
        digester.update(b"garbage from an ignored range response");
        digester.reset();
        digester.update(b"HELLO");

        let pair = digester.finalize();
        assert_eq!(pair.sha1, hex::encode(Sha1Hasher::digest(b"HELLO")));
    }

    #[test]
    fn hex_eq_is_tolerant() {
        assert!(hex_eq("ABCDEF", "abcdef"));
        assert!(hex_eq(" abcdef\n", "abcdef"));
        assert!(!hex_eq("abcdef", "abcde0"));
    }
}
