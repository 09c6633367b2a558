use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (e.g. `data:` URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use metacrawl::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.test/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.test".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true if the URL's host is exactly the domain scope
///
/// Matching is exact and case-insensitive. Subdomains and hosts that merely
/// contain the scope as a substring are out of scope.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use metacrawl::url::in_scope;
///
/// let url = Url::parse("https://example.test/a").unwrap();
/// assert!(in_scope(&url, "example.test"));
///
/// let url = Url::parse("https://example.test.evil.net/a").unwrap();
/// assert!(!in_scope(&url, "example.test"));
/// ```
pub fn in_scope(url: &Url, scope: &str) -> bool {
    match extract_domain(url) {
        Some(domain) => domain.eq_ignore_ascii_case(scope.trim()),
        None => false,
    }
}
