//! # Content Digests
//!
//! `CanonicalBytes` is the only input accepted by [`sha256_digest`]. It is
//! produced by serializing through `serde_json::Value`, whose object map is
//! key-sorted, and emitting compact JSON. Two structurally equal values
//! therefore always digest to the same bytes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compact, key-sorted JSON bytes.
///
/// The inner buffer is private; the only constructor is [`CanonicalBytes::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json::Error` if the value cannot be
    /// represented as JSON (e.g., a map with non-string keys).
    pub fn new(obj: &impl Serialize) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(obj)?;
        serde_json::to_vec(&value).map(Self)
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A SHA-256 content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    /// Render the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

/// Compute a SHA-256 digest over canonical bytes.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    let hash = Sha256::digest(data.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hash);
    ContentDigest(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_canonical_bytes() {
        let a = CanonicalBytes::new(&json!({"b": 1, "a": 2})).unwrap();
        let b = CanonicalBytes::new(&json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_bytes(), br#"{"a":2,"b":1}"#);
    }

    #[test]
    fn empty_object_digest_is_known_value() {
        let digest = sha256_digest(&CanonicalBytes::new(&json!({})).unwrap());
        // SHA-256 of the two bytes "{}".
        assert_eq!(
            digest.to_hex(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn display_is_algorithm_prefixed() {
        let digest = sha256_digest(&CanonicalBytes::new(&json!(null)).unwrap());
        assert!(digest.to_string().starts_with("sha256:"));
        assert_eq!(digest.to_hex().len(), 64);
    }
}
