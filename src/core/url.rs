//! URL types for type-safe location handling.
//!
//! - Internal representation: Always decoded (human-readable)
//! - Browser boundary: Decode on input, encode on output
//!
//! Two types share that doctrine:
//! - [`Location`]: a structural, mutable description of where to navigate
//!   (pathname + query + hash + optional state). Compared by value.
//! - [`Url`]: an immutable, normalized descriptor stamped onto chunks and
//!   routes. Cheap to clone (`Arc` inner) and carries a precomputed `href`.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query parameters, ordered by key so hrefs come out deterministic.
pub type Query = BTreeMap<String, String>;

// ============================================================================
// Location
// ============================================================================

/// A structural description of a navigable URL.
///
/// Invariants:
/// - `pathname` is decoded and starts with `/`
/// - `query` keys and values are decoded
/// - `hash` is stored without the leading `#`
///
/// Two locations are interchangeable when they compare equal, regardless of
/// the strings they were parsed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    #[serde(default, skip_serializing_if = "Query::is_empty")]
    pub query: Query,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Opaque navigation state, never part of the URL string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

impl Location {
    /// Location for a bare pathname with no query, hash or state.
    pub fn path(pathname: impl Into<String>) -> Self {
        Self {
            pathname: lead_slash(pathname.into()),
            query: Query::new(),
            hash: None,
            state: None,
        }
    }

    /// Parse a URL string into its decoded parts.
    ///
    /// Accepts anything a browser address bar would: `/blog/post?v=1#top`,
    /// `search?q=hello%20world`, percent-encoded unicode. Invalid
    /// percent-sequences are preserved verbatim rather than dropped.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::path("/");
        }

        match base().join(trimmed) {
            Ok(parsed) => {
                let pathname = decode_lossless(parsed.path());
                let mut query = Query::new();
                for (key, value) in parsed.query_pairs() {
                    query.insert(key.into_owned(), value.into_owned());
                }
                let hash = parsed
                    .fragment()
                    .filter(|f| !f.is_empty())
                    .map(decode_lossless);
                Self {
                    pathname: lead_slash(pathname),
                    query,
                    hash,
                    state: None,
                }
            }
            // Fallback to a simple split if url parsing fails
            Err(_) => {
                let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
                Self::path(path)
            }
        }
    }

    /// Attach navigation state.
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// The full decoded URL string: pathname + search + hash.
    pub fn href(&self) -> String {
        let mut href = self.pathname.clone();
        href.push_str(&search_string(&self.query));
        if let Some(hash) = &self.hash {
            href.push('#');
            href.push_str(hash);
        }
        href
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::path("/")
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.href())
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Location {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&Location> for Location {
    fn from(location: &Location) -> Self {
        location.clone()
    }
}

// ============================================================================
// Url
// ============================================================================

/// Immutable URL descriptor stamped onto chunks and routes.
///
/// Invariants:
/// - `pathname` is decoded and starts with `/`
/// - normalized urls end with `/`, literal urls keep the matched form
/// - `href` is precomputed at construction
#[derive(Debug, Clone)]
pub struct Url(Arc<UrlData>);

#[derive(Debug, PartialEq)]
struct UrlData {
    pathname: String,
    query: Query,
    hash: Option<String>,
    href: String,
}

impl Url {
    /// Build a url from decoded parts.
    ///
    /// `ensure_trailing_slash` appends `/` to the pathname when missing;
    /// chunks describing a mounted segment want the normalized form, while
    /// redirect targets and literal urls keep the path as matched.
    pub fn new(
        pathname: &str,
        query: Query,
        hash: Option<String>,
        ensure_trailing_slash: bool,
    ) -> Self {
        let trimmed = pathname.trim();
        let mut pathname = if trimmed.is_empty() {
            "/".to_string()
        } else {
            lead_slash(trimmed.to_string())
        };
        if ensure_trailing_slash && !pathname.ends_with('/') {
            pathname.push('/');
        }

        let mut href = pathname.clone();
        href.push_str(&search_string(&query));
        if let Some(hash) = &hash {
            href.push('#');
            href.push_str(hash);
        }

        Self(Arc::new(UrlData {
            pathname,
            query,
            hash,
            href,
        }))
    }

    /// Build a url from a [`Location`], dropping its state.
    pub fn from_location(location: &Location, ensure_trailing_slash: bool) -> Self {
        Self::new(
            &location.pathname,
            location.query.clone(),
            location.hash.clone(),
            ensure_trailing_slash,
        )
    }

    /// Parse and normalize a URL string (trailing slash ensured).
    pub fn parse(input: &str) -> Self {
        Self::from_location(&Location::parse(input), true)
    }

    #[inline]
    pub fn pathname(&self) -> &str {
        &self.0.pathname
    }

    #[inline]
    pub fn query(&self) -> &Query {
        &self.0.query
    }

    #[inline]
    pub fn hash(&self) -> Option<&str> {
        self.0.hash.as_deref()
    }

    /// The full decoded URL string: pathname + search + hash.
    #[inline]
    pub fn href(&self) -> &str {
        &self.0.href
    }

    /// The `?a=1&b=2` part, or an empty string.
    pub fn search(&self) -> String {
        search_string(&self.0.query)
    }

    /// Encode the href for a browser (percent-encode path segments and
    /// query parts, leave separators alone).
    pub fn to_encoded(&self) -> String {
        let mut encoded = self
            .0
            .pathname
            .split('/')
            .map(|segment| utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string())
            .collect::<Vec<_>>()
            .join("/");
        let mut first = true;
        for (key, value) in &self.0.query {
            encoded.push(if first { '?' } else { '&' });
            first = false;
            encoded.push_str(&utf8_percent_encode(key, NON_ALPHANUMERIC).to_string());
            encoded.push('=');
            encoded.push_str(&utf8_percent_encode(value, NON_ALPHANUMERIC).to_string());
        }
        if let Some(hash) = &self.0.hash {
            encoded.push('#');
            encoded.push_str(&utf8_percent_encode(hash, NON_ALPHANUMERIC).to_string());
        }
        encoded
    }

    /// Convert back to a structural location (state-less).
    pub fn to_location(&self) -> Location {
        Location {
            pathname: self.0.pathname.clone(),
            query: self.0.query.clone(),
            hash: self.0.hash.clone(),
            state: None,
        }
    }

    /// Pointer identity, for cheap same-object checks.
    #[inline]
    pub fn ptr_eq(&self, other: &Url) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Url {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Url {}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.href)
    }
}

impl AsRef<str> for Url {
    fn as_ref(&self) -> &str {
        &self.0.href
    }
}

impl Borrow<str> for Url {
    fn borrow(&self) -> &str {
        &self.0.href
    }
}

impl Serialize for Url {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.href.serialize(serializer)
    }
}

// ============================================================================
// Path helpers
// ============================================================================

/// Join a mount path and a remaining path into one pathname.
///
/// `join_paths("/blog", "/missing")` -> `/blog/missing`,
/// `join_paths("", "/about")` -> `/about`, `join_paths("/blog", "")` -> `/blog`.
pub fn join_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{path}"),
    }
}

/// Split a pathname into non-empty segments.
///
/// `/blog/post/` -> `["blog", "post"]`, `/` and `` -> `[]`.
pub fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn lead_slash(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

fn search_string(query: &Query) -> String {
    let mut search = String::new();
    let mut first = true;
    for (key, value) in query {
        search.push(if first { '?' } else { '&' });
        first = false;
        search.push_str(key);
        if !value.is_empty() {
            search.push('=');
            search.push_str(value);
        }
    }
    search
}

fn decode_lossless(encoded: &str) -> String {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| encoded.to_string())
}

fn base() -> &'static url::Url {
    // Dummy base so relative inputs parse like absolute ones
    static BASE: std::sync::OnceLock<url::Url> = std::sync::OnceLock::new();
    BASE.get_or_init(|| url::Url::parse("http://x").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pathname_only() {
        let location = Location::parse("/blog/post");
        assert_eq!(location.pathname, "/blog/post");
        assert!(location.query.is_empty());
        assert_eq!(location.hash, None);
    }

    #[test]
    fn test_parse_query_and_hash() {
        let location = Location::parse("/search?q=hello&page=2#results");
        assert_eq!(location.pathname, "/search");
        assert_eq!(location.query.get("q").map(String::as_str), Some("hello"));
        assert_eq!(location.query.get("page").map(String::as_str), Some("2"));
        assert_eq!(location.hash.as_deref(), Some("results"));
    }

    #[test]
    fn test_parse_decodes_percent_sequences() {
        let location = Location::parse("/posts/%E4%B8%AD%E6%96%87?q=hello%20world");
        assert_eq!(location.pathname, "/posts/中文");
        assert_eq!(
            location.query.get("q").map(String::as_str),
            Some("hello world")
        );
    }

    #[test]
    fn test_parse_invalid_utf8_preserved() {
        let location = Location::parse("/posts/%FF/");
        assert_eq!(location.pathname, "/posts/%FF/");
    }

    #[test]
    fn test_parse_relative_input() {
        let location = Location::parse("blog/post?v=1");
        assert_eq!(location.pathname, "/blog/post");
        assert_eq!(location.query.get("v").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_parse_empty_is_root() {
        assert_eq!(Location::parse("").pathname, "/");
        assert_eq!(Location::parse("/").pathname, "/");
    }

    #[test]
    fn test_locations_compare_structurally() {
        let a = Location::parse("/blog/post?b=2&a=1");
        let b = Location::parse("/blog/post?a=1&b=2");
        assert_eq!(a, b);
        assert_ne!(a, Location::parse("/blog/post?a=1"));
    }

    #[test]
    fn test_location_href_round_trip() {
        let location = Location::parse("/search?page=2&q=hi#top");
        assert_eq!(location.href(), "/search?page=2&q=hi#top");
    }

    #[test]
    fn test_url_trailing_slash_normalization() {
        let url = Url::new("/blog/post", Query::new(), None, true);
        assert_eq!(url.pathname(), "/blog/post/");
        assert_eq!(url.href(), "/blog/post/");
    }

    #[test]
    fn test_url_literal_form_kept() {
        let url = Url::new("/blog/post", Query::new(), None, false);
        assert_eq!(url.pathname(), "/blog/post");
    }

    #[test]
    fn test_url_empty_pathname_is_root() {
        let url = Url::new("", Query::new(), None, true);
        assert_eq!(url.pathname(), "/");
        assert_eq!(url.href(), "/");
    }

    #[test]
    fn test_url_href_includes_search_and_hash() {
        let mut query = Query::new();
        query.insert("a".to_string(), "1".to_string());
        query.insert("b".to_string(), "2".to_string());
        let url = Url::new("/search", query, Some("top".to_string()), true);
        assert_eq!(url.href(), "/search/?a=1&b=2#top");
    }

    #[test]
    fn test_url_equality_is_structural() {
        let a = Url::parse("/blog/post?v=1");
        let b = Url::parse("/blog/post/?v=1");
        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));

        let c = a.clone();
        assert!(a.ptr_eq(&c));
    }

    #[test]
    fn test_url_to_encoded() {
        let url = Url::new("/posts/中文", Query::new(), None, true);
        assert_eq!(url.to_encoded(), "/posts/%E4%B8%AD%E6%96%87/");

        let url = Url::new("/posts/hello world", Query::new(), None, true);
        assert_eq!(url.to_encoded(), "/posts/hello%20world/");
    }

    #[test]
    fn test_url_serializes_as_href() {
        let url = Url::parse("/blog/post?v=1");
        let json = serde_json::to_string(&url).unwrap();
        assert_eq!(json, r#""/blog/post/?v=1""#);
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("/blog", "/missing"), "/blog/missing");
        assert_eq!(join_paths("/blog/", "/missing"), "/blog/missing");
        assert_eq!(join_paths("/blog", "missing"), "/blog/missing");
        assert_eq!(join_paths("", "/about"), "/about");
        assert_eq!(join_paths("/", "/about"), "/about");
        assert_eq!(join_paths("/blog", ""), "/blog");
        assert_eq!(join_paths("", ""), "/");
    }

    #[test]
    fn test_split_segments() {
        assert_eq!(split_segments("/blog/post/"), vec!["blog", "post"]);
        assert_eq!(split_segments("/blog//post"), vec!["blog", "post"]);
        assert!(split_segments("/").is_empty());
        assert!(split_segments("").is_empty());
    }

    #[test]
    fn test_base_join_behavior() {
        // Verify url crate join behavior the parser relies on
        let base = url::Url::parse("http://x").unwrap();
        assert_eq!(base.join("/blog/post?v=1").unwrap().path(), "/blog/post");
        assert_eq!(base.join("blog/post#s").unwrap().path(), "/blog/post");
        assert_eq!(base.join("?v=1").unwrap().path(), "/");
        assert_eq!(
            base.join("/blog/中文").unwrap().path(),
            "/blog/%E4%B8%AD%E6%96%87"
        );
    }
}
