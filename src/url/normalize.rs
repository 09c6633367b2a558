use crate::url::domain::in_scope;
use crate::UrlError;
use std::collections::BTreeSet;
use url::Url;

/// Schemes whose hrefs never point at a crawlable page
const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Returns the canonical frontier key for a URL: the URL without its fragment
///
/// Canonicalization is idempotent.
///
/// ```
/// use url::Url;
/// use metacrawl::url::canonicalize;
///
/// let url = Url::parse("https://example.test/b#section").unwrap();
/// assert_eq!(canonicalize(&url).as_str(), "https://example.test/b");
/// ```
pub fn canonicalize(url: &Url) -> Url {
    let mut canonical = url.clone();
    canonical.set_fragment(None);
    canonical
}

/// Parses a seed URL into its canonical form
///
/// Seeds are exempt from domain scoping, but they must still be absolute
/// HTTP(S) URLs with a host.
pub fn parse_seed(seed: &str) -> Result<Url, UrlError> {
    let url = Url::parse(seed.trim()).map_err(|e| UrlError::Parse(format!("{}: {}", seed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    Ok(canonicalize(&url))
}

/// Resolves and filters the hrefs found on a page
///
/// Every href is resolved against `base`, stripped of its fragment and kept
/// only if it is an HTTP(S) URL whose host is exactly `scope`. The result has
/// set semantics. Malformed hrefs are dropped silently.
///
/// This function never consults the frontier; deduplication against already
/// known URLs is the caller's job.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use metacrawl::url::normalize_links;
///
/// let base = Url::parse("https://example.test/a").unwrap();
/// let hrefs = vec![
///     "https://example.test/b#section".to_string(),
///     "https://other.test/x".to_string(),
///     "/a".to_string(),
/// ];
/// let links = normalize_links(&base, &hrefs, "example.test");
/// let links: Vec<&str> = links.iter().map(|u| u.as_str()).collect();
/// assert_eq!(links, vec!["https://example.test/a", "https://example.test/b"]);
/// ```
pub fn normalize_links(base: &Url, hrefs: &[String], scope: &str) -> BTreeSet<Url> {
    hrefs
        .iter()
        .filter_map(|href| resolve_href(base, href))
        .filter(|url| in_scope(url, scope))
        .collect()
}

/// Resolves one href against the base URL
///
/// Returns None for empty hrefs, non-navigational schemes, unparseable
/// values and anything that does not resolve to HTTP(S).
fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
        return None;
    }

    let resolved = base.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }

    Some(canonicalize(&resolved))
}
