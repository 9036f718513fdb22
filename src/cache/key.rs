use std::fmt;

use crate::http::{Method, Request};

/// Coarse identity of a request for caching purposes.
///
/// Two requests with the same authority, method and path map to the same key
/// regardless of query string, headers or body. Values are taken verbatim: no
/// case folding, no trailing-slash normalization.
///
/// # Examples
///
/// ```
/// use respcache::cache::CacheKey;
/// use respcache::http::request::Request;
///
/// let (a, _) = Request::parse(b"GET /a?x=1 HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
/// let (b, _) = Request::parse(b"GET /a?x=2 HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
///
/// assert_eq!(CacheKey::from_request(&a), CacheKey::from_request(&b));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    authority: Option<String>,
    method: Method,
    path: String,
}

impl CacheKey {
    pub fn new(authority: Option<&str>, method: Method, path: impl Into<String>) -> Self {
        Self {
            authority: authority.map(str::to_owned),
            method,
            path: path.into(),
        }
    }

    /// Derives the key for `request`.
    pub fn from_request(request: &Request) -> Self {
        Self::new(
            request.authority(),
            request.method().clone(),
            request.path(),
        )
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.authority.as_deref().unwrap_or("-"),
            self.method,
            self.path
        )
    }
}
