//! URL canonicalization for consistent store keys.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize an absolute URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    normalize(parsed)
}

/// Resolve a manifest entry against the application origin.
///
/// Absolute entries are canonicalized as-is; relative entries such as
/// `./index.html` are joined onto `base`.
pub fn resolve(base: &url::Url, input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    if trimmed.contains("://") {
        return canonicalize(trimmed);
    }

    let joined = base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    normalize(joined)
}

fn normalize(mut parsed: url::Url) -> Result<url::Url, UrlError> {
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("rebrickable.com/api/v3/lego/sets/").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/api/v3/lego/sets/");
    }

    #[test]
    fn test_canonicalize_lowercase_host_and_fragment() {
        let url = canonicalize("https://CDN.Rebrickable.COM/media/sets/1.jpg#zoom").unwrap();
        assert_eq!(url.as_str(), "https://cdn.rebrickable.com/media/sets/1.jpg");
    }

    #[test]
    fn test_canonicalize_preserve_query() {
        let url = canonicalize("https://example.com/api?b=2&a=1").unwrap();
        assert_eq!(url.query(), Some("b=2&a=1"));
    }

    #[test]
    fn test_canonicalize_rejects_bad_input() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_resolve_relative() {
        let base = url::Url::parse("http://localhost:8080/catalog/").unwrap();
        assert_eq!(resolve(&base, "./").unwrap().as_str(), "http://localhost:8080/catalog/");
        assert_eq!(resolve(&base, "./index.html").unwrap().as_str(), "http://localhost:8080/catalog/index.html");
        assert_eq!(resolve(&base, "/favicon.ico").unwrap().as_str(), "http://localhost:8080/favicon.ico");
    }

    #[test]
    fn test_resolve_absolute() {
        let base = url::Url::parse("http://localhost:8080/").unwrap();
        let url = resolve(&base, "https://cdn.rebrickable.com/logo.png#x").unwrap();
        assert_eq!(url.as_str(), "https://cdn.rebrickable.com/logo.png");
    }
}
