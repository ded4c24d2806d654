//! Request identity used as the store key.

use sha2::{Digest, Sha256};
use std::fmt;

/// Normalized request identity: upper-cased method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: &str) -> Self {
        let url = match url.split_once('#') {
            Some((base, _)) => base,
            None => url,
        };
        Self { method: method.to_ascii_uppercase(), url: url.to_string() }
    }

    /// Shorthand for a `GET` key, the only kind strategies write.
    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }

    /// Hex SHA-256 of the key, used as the row key inside a store.
    pub fn hash(&self) -> String {
        compute_cache_key(&self.method, &self.url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Compute the store key hash for a method and URL.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let a = RequestKey::get("https://example.com/api/sets/1");
        let b = RequestKey::get("https://example.com/api/sets/1");
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_differs_by_method() {
        let get = RequestKey::new("GET", "https://example.com/");
        let head = RequestKey::new("HEAD", "https://example.com/");
        assert_ne!(get.hash(), head.hash());
    }

    #[test]
    fn test_method_is_uppercased() {
        let key = RequestKey::new("get", "https://example.com/");
        assert_eq!(key.method, "GET");
        assert_eq!(key, RequestKey::get("https://example.com/"));
    }

    #[test]
    fn test_fragment_is_ignored() {
        let key = RequestKey::get("https://example.com/index.html#top");
        assert_eq!(key.url, "https://example.com/index.html");
    }

    #[test]
    fn test_hash_format() {
        let hash = RequestKey::get("https://example.com").hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_display() {
        assert_eq!(RequestKey::get("https://example.com/a").to_string(), "GET https://example.com/a");
    }
}
