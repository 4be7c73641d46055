//! C1 — stable short identifier for (language, version, normalized source).

use sha2::{Digest, Sha256};
use std::fmt;

/// 16 hex character digest, stored as the raw 8 bytes it represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 8]);

impl Fingerprint {
    pub fn as_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

/// Trim leading/trailing whitespace and collapse internal whitespace runs to
/// a single space. Two sources differing only by this normalization share a
/// fingerprint (spec §8 "normalization law").
fn normalize(source: &str) -> String {
    source.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derive the fingerprint of a `(language, version, source)` triple.
///
/// Uses SHA-256 over `language:version:normalized_source`, truncated to the
/// first 8 bytes (16 hex digits). Collisions at 2^64 are negligible for this
/// workload; distinct sources must not collide with practical probability.
pub fn fingerprint(language: &str, version: &str, source: &[u8]) -> Fingerprint {
    let source_str = String::from_utf8_lossy(source);
    let normalized = normalize(&source_str);

    let mut hasher = Sha256::new();
    hasher.update(language.as_bytes());
    hasher.update(b":");
    hasher.update(version.as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Fingerprint(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_fingerprint() {
        let a = fingerprint("javascript", "es2022", b"console.log(1)");
        let b = fingerprint("javascript", "es2022", b"console.log(1)");
        assert_eq!(a, b);
    }

    #[test]
    fn different_source_different_fingerprint() {
        let a = fingerprint("javascript", "es2022", b"console.log(1)");
        let b = fingerprint("javascript", "es2022", b"console.log(2)");
        assert_ne!(a, b);
    }

    #[test]
    fn different_language_different_fingerprint() {
        let a = fingerprint("javascript", "es2022", b"print(1)");
        let b = fingerprint("python", "es2022", b"print(1)");
        assert_ne!(a, b);
    }

    #[test]
    fn trailing_whitespace_normalizes_to_same_fingerprint() {
        let a = fingerprint("python", "3.11", b"print(1)");
        let b = fingerprint("python", "3.11", b"  print(1)  \n");
        assert_eq!(a, b);
    }

    #[test]
    fn collapsible_internal_whitespace_normalizes_to_same_fingerprint() {
        let a = fingerprint("python", "3.11", b"print(1,   2)");
        let b = fingerprint("python", "3.11", b"print(1, 2)");
        assert_eq!(a, b);
    }

    #[test]
    fn hex_is_sixteen_characters() {
        let fp = fingerprint("java", "17", b"class Main {}");
        assert_eq!(fp.as_hex().len(), 16);
    }
}
