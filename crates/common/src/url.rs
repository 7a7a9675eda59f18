//! URL normalization — the sole deduplication key for everything the
//! pipeline stores.
//!
//! Every boundary (enqueue, check-and-load, cache lookup) passes URLs through
//! [`normalize_url`] before touching a store. Normalization is pure and
//! idempotent: `normalize_url(normalize_url(x)) == normalize_url(x)`.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Invalid URL: {0}")]
    Parse(String),

    #[error("Unsupported scheme: {0}")]
    Scheme(String),

    #[error("URL has no host")]
    NoHost,
}

/// Canonicalize a blog URL.
///
/// Strips the fragment, lower-cases scheme and host, removes default ports,
/// removes the trailing slash on the path, collapses duplicate slashes, and
/// removes a leading `www.`. The query string is preserved byte-for-byte,
/// ordering unchanged.
pub fn normalize_url(raw: &str) -> Result<String, UrlError> {
    let parsed = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    let scheme = parsed.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(UrlError::Scheme(scheme));
    }

    let host = parsed.host_str().ok_or(UrlError::NoHost)?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return Err(UrlError::NoHost);
    }

    // The url crate already drops default ports (80/http, 443/https); any
    // port still present is non-default and kept.
    let port = match parsed.port() {
        Some(p) => format!(":{}", p),
        None => String::new(),
    };

    let path = normalize_path(parsed.path());

    let query = match parsed.query() {
        Some(q) if !q.is_empty() => format!("?{}", q),
        _ => String::new(),
    };

    Ok(format!("{}://{}{}{}{}", scheme, host, port, path, query))
}

/// Collapse duplicate slashes and strip the trailing slash. The root path
/// normalizes to the empty string.
fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push('/');
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    while out.ends_with('/') {
        out.pop();
    }
    out
}

/// Extract the canonical domain (lower-cased host, no leading `www.`) from a
/// raw or normalized URL.
pub fn domain_of(raw: &str) -> Result<String, UrlError> {
    let parsed = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    let host = parsed.host_str().ok_or(UrlError::NoHost)?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return Err(UrlError::NoHost);
    }
    Ok(host.to_string())
}

/// Whether `host` equals `registered` or is a subdomain of it.
/// The match is only accepted at a label boundary: `evilexample.com` does
/// NOT match a publisher registered at `example.com`.
pub fn is_same_or_subdomain(host: &str, registered: &str) -> bool {
    if host == registered {
        return true;
    }
    host.len() > registered.len()
        && host.ends_with(registered)
        && host.as_bytes()[host.len() - registered.len() - 1] == b'.'
}

/// All registrable suffixes of `host` at label boundaries, longest first,
/// down to two labels. Used for apex-tolerant publisher lookup:
/// `a.b.example.com` yields `["a.b.example.com", "b.example.com", "example.com"]`.
pub fn parent_domains(host: &str) -> Vec<String> {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 {
        return vec![host.to_string()];
    }
    (0..=labels.len() - 2)
        .map(|i| labels[i..].join("."))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(
            normalize_url("https://www.Example.com/a/").unwrap(),
            "https://example.com/a"
        );
        assert_eq!(
            normalize_url("HTTP://example.com:80/post").unwrap(),
            "http://example.com/post"
        );
        assert_eq!(
            normalize_url("https://example.com:443/post").unwrap(),
            "https://example.com/post"
        );
    }

    #[test]
    fn test_normalize_strips_fragment_keeps_query() {
        assert_eq!(
            normalize_url("https://example.com/a?b=2&a=1#section").unwrap(),
            "https://example.com/a?b=2&a=1"
        );
    }

    #[test]
    fn test_normalize_collapses_slashes() {
        assert_eq!(
            normalize_url("https://example.com//a///b/").unwrap(),
            "https://example.com/a/b"
        );
    }

    #[test]
    fn test_normalize_root_path() {
        assert_eq!(
            normalize_url("https://www.example.com/").unwrap(),
            "https://example.com"
        );
        assert_eq!(
            normalize_url("https://example.com").unwrap(),
            "https://example.com"
        );
    }

    #[test]
    fn test_normalize_keeps_non_default_port() {
        assert_eq!(
            normalize_url("https://example.com:8443/x").unwrap(),
            "https://example.com:8443/x"
        );
    }

    #[test]
    fn test_normalize_idempotent() {
        let inputs = [
            "https://www.Example.com//a/b/?q=1&r=2#frag",
            "http://example.com:80/",
            "https://blog.example.co.uk/post/2024//intro",
        ];
        for input in inputs {
            let once = normalize_url(input).unwrap();
            let twice = normalize_url(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", input);
        }
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(normalize_url("not a url").is_err());
        assert!(normalize_url("ftp://example.com/file").is_err());
        assert!(normalize_url("https:///nohost").is_err());
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(
            domain_of("https://www.Example.com/a").unwrap(),
            "example.com"
        );
        assert_eq!(domain_of("https://a.b.example.com/x").unwrap(), "a.b.example.com");
    }

    #[test]
    fn test_subdomain_matching() {
        assert!(is_same_or_subdomain("example.com", "example.com"));
        assert!(is_same_or_subdomain("blog.example.com", "example.com"));
        assert!(is_same_or_subdomain("a.b.example.com", "example.com"));
        assert!(!is_same_or_subdomain("evilexample.com", "example.com"));
        assert!(!is_same_or_subdomain("example.com", "blog.example.com"));
        assert!(!is_same_or_subdomain("example.org", "example.com"));
    }

    #[test]
    fn test_parent_domains() {
        assert_eq!(
            parent_domains("a.b.example.com"),
            vec!["a.b.example.com", "b.example.com", "example.com"]
        );
        assert_eq!(parent_domains("example.com"), vec!["example.com"]);
        assert_eq!(parent_domains("localhost"), vec!["localhost"]);
    }
}
