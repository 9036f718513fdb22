use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::http::{Body, Headers, Response, StatusCode, response::Parts};

use super::control::CacheControl;
use super::policy::{self, Cachability, MissingMaxAge};

/// A captured response, ready to be replayed.
///
/// Built once, when a miss response has been streamed to completion, and
/// never mutated afterwards. Hits are served from [`to_response`](Self::to_response),
/// which hands out an independent copy.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    created_at: Instant,
    freshness_lifetime: Option<Duration>,
}

impl CacheEntry {
    /// Captures a completed response. The creation instant is taken now, not
    /// when the request arrived.
    pub fn new(status: StatusCode, headers: Headers, body: Bytes) -> Self {
        let freshness_lifetime = CacheControl::from_headers(&headers).and_then(|cc| cc.max_age());
        Self {
            status,
            headers,
            body,
            created_at: Instant::now(),
            freshness_lifetime,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// `max-age` of the captured response, if it had one.
    pub fn freshness_lifetime(&self) -> Option<Duration> {
        self.freshness_lifetime
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// `true` once the entry has outlived its freshness lifetime.
    ///
    /// An entry exactly `max-age` old is still fresh. Without a lifetime the
    /// outcome is whatever `missing` prescribes.
    pub fn is_expired(&self, missing: MissingMaxAge) -> bool {
        match self.freshness_lifetime {
            Some(lifetime) => self.age() > lifetime,
            None => missing == MissingMaxAge::Expired,
        }
    }

    pub fn cachability(&self) -> Cachability {
        policy::response_cachability(&self.headers)
    }

    /// Builds a response that shares nothing mutable with this entry.
    ///
    /// The headers are cloned; the body is a fresh single-pass [`Body`] over
    /// the captured bytes, which are immutable. Draining or editing the
    /// returned response leaves the entry and every other copy untouched.
    pub fn to_response(&self) -> Response {
        let parts = Parts {
            status: self.status,
            headers: self.headers.clone(),
            keep_alive: true,
        };
        Response::from_parts(parts, Body::full(self.body.clone()))
    }
}
