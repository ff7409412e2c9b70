//! Cache key derivation.

/// Identifies one logical image result in the caches.
///
/// Built from the resolved source path (or a stream marker) and an optional
/// custom key. Transformations and downsample hints are not part of the key,
/// so two requests for the same path share cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a key from a raw string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives the key for a path, combined with an optional custom key.
    #[must_use]
    pub fn derive(path: &str, custom: Option<&str>) -> Self {
        match custom.filter(|c| !c.trim().is_empty()) {
            Some(custom) => Self(format!("{custom};{path}")),
            None => Self(path.to_string()),
        }
    }

    /// Returns a stable hex digest suitable for file names.
    #[must_use]
    pub fn digest(&self) -> String {
        digest_str(&self.0)
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Hashes an arbitrary string into a 32 character hex digest.
#[must_use]
pub fn digest_str(value: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_without_custom_key() {
        let key = CacheKey::derive("https://example.com/a.png", None);
        assert_eq!(key.as_str(), "https://example.com/a.png");
    }

    #[test]
    fn test_derive_with_custom_key() {
        let key = CacheKey::derive("https://example.com/a.png", Some("thumb"));
        assert_eq!(key.as_str(), "thumb;https://example.com/a.png");
    }

    #[test]
    fn test_blank_custom_key_is_ignored() {
        let key = CacheKey::derive("a.png", Some("  "));
        assert_eq!(key.as_str(), "a.png");
    }

    #[test]
    fn test_digest_consistency() {
        let a = CacheKey::new("https://example.com/image.png");
        let b = CacheKey::new("https://example.com/image.png");
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 32);
        assert_ne!(a.digest(), CacheKey::new("other").digest());
    }
}
