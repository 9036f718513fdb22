//! Cachability rules.
//!
//! A response is stored only when both hold: the request method is `GET` or
//! `HEAD`, and the response explicitly says `Cache-Control: public` without
//! also saying `private`. Anything less explicit is not stored.

use crate::http::{Headers, Method};

use super::control::CacheControl;

/// Outcome of inspecting a response's `Cache-Control` directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cachability {
    /// `public` and not `private`.
    Cachable,
    /// `private`, whatever else is present.
    NotCachable,
    /// No header, or neither `public` nor `private`.
    Undetermined,
}

impl Cachability {
    /// Only an explicit [`Cachable`](Self::Cachable) may be stored;
    /// [`Undetermined`](Self::Undetermined) is refused like `NotCachable`.
    pub fn is_storable(self) -> bool {
        matches!(self, Self::Cachable)
    }
}

/// What [`CacheEntry::is_expired`](super::CacheEntry::is_expired) decides for
/// an entry whose response carried no `max-age`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingMaxAge {
    /// The entry is stale on its next lookup and is evicted then.
    #[default]
    Expired,
    /// The entry stays fresh until it is overwritten.
    NeverExpires,
}

/// `true` iff the method is `GET` or `HEAD`.
pub fn request_is_cachable(method: &Method) -> bool {
    matches!(method, Method::Get | Method::Head)
}

/// Classifies a response by its `Cache-Control` headers.
pub fn response_cachability(headers: &Headers) -> Cachability {
    match CacheControl::from_headers(headers) {
        Some(cc) if cc.is_private() => Cachability::NotCachable,
        Some(cc) if cc.is_public() => Cachability::Cachable,
        _ => Cachability::Undetermined,
    }
}
