//! In-memory response caching.
//!
//! [`CacheMiddleware`] answers repeated `GET`/`HEAD` requests for the same
//! `(authority, method, path)` from memory, as long as the upstream marked the
//! response `Cache-Control: public` and its `max-age` has not run out.
//!
//! The pieces, leaf first:
//!
//! - [`CacheKey`] — request identity.
//! - [`CacheControl`] — the `public` / `private` / `max-age` directives.
//! - [`policy`] — request and response cachability.
//! - [`CacheEntry`] — a captured response with its age and lifetime.
//! - [`capture`] — body tee that hands over a complete copy after the
//!   consumer has drained the response.
//! - [`CacheStore`] — the shared key → entry map.
//!
//! There is no eviction besides expiry-on-lookup and overwrite, no `Vary`
//! handling, and no coalescing of concurrent misses.

pub mod capture;
pub mod control;
pub mod entry;
pub mod key;
pub mod middleware;
pub mod policy;
pub mod store;

pub use capture::{CaptureBody, capture};
pub use control::CacheControl;
pub use entry::CacheEntry;
pub use key::CacheKey;
pub use middleware::CacheMiddleware;
pub use policy::{Cachability, MissingMaxAge};
pub use store::CacheStore;
