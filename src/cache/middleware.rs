use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::http::{Request, Response};
use crate::middleware::{Middleware, Next, ResponseFuture};

use super::capture::capture;
use super::entry::CacheEntry;
use super::key::CacheKey;
use super::policy::{self, MissingMaxAge};
use super::store::CacheStore;

/// Middleware that serves repeated `GET`/`HEAD` requests from memory.
///
/// Per request:
///
/// 1. **Lookup** — derive the [`CacheKey`] and consult the [`CacheStore`].
/// 2. **Hit** — a fresh entry is answered with an independent copy and the
///    upstream is not called. A stale entry is removed and the request falls
///    through to the miss path.
/// 3. **Miss** — the request is forwarded. For `GET`/`HEAD` the response body
///    is wrapped with [`capture`]; once the consumer has drained it, the
///    captured copy is stored if the response says `Cache-Control: public`
///    (and not `private`). Other methods get the upstream response untouched.
///
/// Concurrent misses for one key are not coalesced: each reaches the upstream
/// and the capture that completes last owns the entry.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use respcache::Pipeline;
/// use respcache::cache::{CacheMiddleware, CacheStore, MissingMaxAge};
/// # use respcache::{Response, StatusCode};
///
/// let store = CacheStore::new();
/// let cache = Arc::new(
///     CacheMiddleware::new()
///         .with_store(store.clone())
///         .missing_max_age(MissingMaxAge::NeverExpires),
/// );
/// # let pipeline = Pipeline::new(|_req| async { Response::new(StatusCode::Ok) })
/// #     .layer(Arc::clone(&cache));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheMiddleware {
    store: CacheStore,
    hits: Arc<AtomicU64>,
    missing_max_age: MissingMaxAge,
}

impl CacheMiddleware {
    /// A cache with its own empty store and the default [`MissingMaxAge`] policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `store` instead of a private one, e.g. to share entries between
    /// several pipelines or to inspect them from outside.
    #[must_use]
    pub fn with_store(mut self, store: CacheStore) -> Self {
        self.store = store;
        self
    }

    /// Sets how entries without `max-age` age out.
    #[must_use]
    pub fn missing_max_age(mut self, policy: MissingMaxAge) -> Self {
        self.missing_max_age = policy;
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Number of requests answered from the cache so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn key(&self, request: &Request) -> CacheKey {
        CacheKey::from_request(request)
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, request: Request, next: Next) -> ResponseFuture {
        let store = self.store.clone();
        let hits = Arc::clone(&self.hits);
        let missing_max_age = self.missing_max_age;
        let key = self.key(&request);

        Box::pin(async move {
            if let Some(entry) = store.get(&key) {
                if entry.is_expired(missing_max_age) {
                    info!(key = %key, age = ?entry.age(), "cache expired");
                    store.remove_if(&key, |current| Arc::ptr_eq(current, &entry));
                } else {
                    let count = hits.fetch_add(1, Ordering::Relaxed) + 1;
                    info!(key = %key, hits = count, "cache hit");
                    return entry.to_response();
                }
            }

            if !policy::request_is_cachable(request.method()) {
                info!(key = %key, "cache miss");
                return next.run(request).await;
            }

            info!(key = %key, "wrapping response for capture");
            let response = next.run(request).await;
            wrap(store, key, response)
        })
    }
}

// Replaces the response body with a capturing tee that stores the entry once
// the body has been fully delivered.
fn wrap(store: CacheStore, key: CacheKey, response: Response) -> Response {
    let (parts, body) = response.into_parts();
    let status = parts.status;
    let headers = parts.headers.clone();

    let body = capture(body, move |captured| {
        let entry = CacheEntry::new(status, headers, captured);
        let cachability = entry.cachability();
        if cachability.is_storable() {
            debug!(key = %key, bytes = entry.body().len(), "storing cache entry");
            store.insert(key, entry);
        } else {
            debug!(key = %key, ?cachability, "response not cachable");
        }
    });

    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::stream;

    use super::*;
    use crate::http::{Body, BodyError, Method, StatusCode};
    use crate::middleware::Pipeline;

    fn request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    // Upstream that counts calls and answers "v<n>" with the given Cache-Control.
    fn upstream(
        cache_control: Option<&'static str>,
    ) -> (Arc<AtomicUsize>, CacheMiddleware, Pipeline) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = CacheMiddleware::new();
        let pipeline = Pipeline::new(move |_request| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                let mut response = Response::new(StatusCode::Ok)
                    .header("Content-Type", "text/plain")
                    .body(format!("v{n}"));
                if let Some(value) = cache_control {
                    response.add_header("Cache-Control", value);
                }
                response
            }
        })
        .layer(Arc::new(cache.clone()));
        (calls, cache, pipeline)
    }

    async fn fetch(pipeline: &Pipeline, method: &str, path: &str) -> (StatusCode, Bytes) {
        let response = pipeline.handle(request(method, path)).await;
        let status = response.status();
        (status, response.into_body().collect().await.unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn public_response_is_served_from_cache_until_stale() {
        let (calls, cache, pipeline) = upstream(Some("public, max-age=60"));

        assert_eq!(fetch(&pipeline, "GET", "/a").await.1, "v1");
        assert_eq!(cache.hits(), 0);
        assert_eq!(cache.store().len(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        let (status, body) = fetch(&pipeline, "GET", "/a").await;
        assert_eq!((status, body.as_ref()), (StatusCode::Ok, &b"v1"[..]));
        assert_eq!(cache.hits(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(fetch(&pipeline, "GET", "/a").await.1, "v2");
        assert_eq!(cache.hits(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The fresh capture replaced the stale entry.
        assert_eq!(fetch(&pipeline, "GET", "/a").await.1, "v2");
        assert_eq!(cache.hits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_removed_before_forwarding() {
        let (_calls, cache, pipeline) = upstream(Some("public, max-age=1"));
        fetch(&pipeline, "GET", "/a").await;
        tokio::time::advance(Duration::from_secs(2)).await;

        // Hold the miss response without draining it: the stale entry is
        // already gone and the new one is not stored yet.
        let pending = pipeline.handle(request("GET", "/a")).await;
        assert!(cache.store().is_empty());

        pending.into_body().collect().await.unwrap();
        assert_eq!(cache.store().len(), 1);
    }

    #[tokio::test]
    async fn hit_returns_independent_copy() {
        let (_calls, cache, pipeline) = upstream(Some("public, max-age=60"));
        fetch(&pipeline, "GET", "/a").await;

        let mut first = pipeline.handle(request("GET", "/a")).await;
        first.headers_mut().set("Content-Type", "application/json");
        first.add_header("X-Mutated", "1");
        first.into_body().collect().await.unwrap();

        let second = pipeline.handle(request("GET", "/a")).await;
        assert_eq!(cache.hits(), 2);
        assert_eq!(second.headers().get("content-type"), Some("text/plain"));
        assert_eq!(
            second.headers().get("cache-control"),
            Some("public, max-age=60")
        );
        assert!(!second.headers().contains("x-mutated"));
        assert_eq!(second.into_body().collect().await.unwrap(), "v1");
    }

    #[tokio::test]
    async fn head_requests_are_cached_separately() {
        let (calls, cache, pipeline) = upstream(Some("public, max-age=60"));
        fetch(&pipeline, "HEAD", "/a").await;
        fetch(&pipeline, "GET", "/a").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.store().len(), 2);

        fetch(&pipeline, "HEAD", "/a").await;
        assert_eq!(cache.hits(), 1);
    }

    #[tokio::test]
    async fn private_response_is_never_stored() {
        let (calls, cache, pipeline) = upstream(Some("private, max-age=60"));
        fetch(&pipeline, "GET", "/a").await;
        fetch(&pipeline, "GET", "/a").await;
        assert!(cache.store().is_empty());
        assert_eq!(cache.hits(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_cache_control_is_never_stored() {
        let (calls, cache, pipeline) = upstream(None);
        assert_eq!(fetch(&pipeline, "GET", "/a").await.1, "v1");
        assert_eq!(fetch(&pipeline, "GET", "/a").await.1, "v2");
        assert!(cache.store().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn max_age_without_public_is_never_stored() {
        let (_calls, cache, pipeline) = upstream(Some("max-age=60"));
        fetch(&pipeline, "GET", "/a").await;
        assert!(cache.store().is_empty());
    }

    #[tokio::test]
    async fn post_is_forwarded_untouched() {
        let (calls, cache, pipeline) = upstream(Some("public, max-age=60"));
        fetch(&pipeline, "POST", "/a").await;
        fetch(&pipeline, "POST", "/a").await;
        assert!(cache.store().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn query_string_shares_the_entry() {
        let (calls, cache, pipeline) = upstream(Some("public, max-age=60"));
        fetch(&pipeline, "GET", "/search?q=1").await;
        assert_eq!(fetch(&pipeline, "GET", "/search?q=2").await.1, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.hits(), 1);
    }

    #[tokio::test]
    async fn overlapping_misses_both_reach_upstream_and_last_capture_wins() {
        let (calls, cache, pipeline) = upstream(Some("public, max-age=60"));

        let first = pipeline.handle(request("GET", "/a")).await;
        let second = pipeline.handle(request("GET", "/a")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.store().is_empty());

        assert_eq!(second.into_body().collect().await.unwrap(), "v2");
        assert_eq!(first.into_body().collect().await.unwrap(), "v1");

        let key = CacheKey::new(Some("example.com"), Method::Get, "/a");
        assert_eq!(cache.store().get(&key).unwrap().body(), "v1");
        assert_eq!(fetch(&pipeline, "GET", "/a").await.1, "v1");
    }

    #[tokio::test]
    async fn abandoned_body_is_not_cached() {
        let (_calls, cache, pipeline) = upstream(Some("public, max-age=60"));
        drop(pipeline.handle(request("GET", "/a")).await);
        assert!(cache.store().is_empty());
    }

    #[tokio::test]
    async fn failed_body_is_not_cached_and_error_reaches_caller() {
        let cache = CacheMiddleware::new();
        let pipeline = Pipeline::new(|_request| async {
            let chunks = stream::iter(vec![
                Ok(Bytes::from_static(b"par")),
                Err(BodyError::upstream("upstream hung up")),
            ]);
            Response::new(StatusCode::Ok)
                .header("Cache-Control", "public, max-age=60")
                .body(Body::from_stream(chunks))
        })
        .layer(Arc::new(cache.clone()));

        let response = pipeline.handle(request("GET", "/a")).await;
        assert!(response.into_body().collect().await.is_err());
        assert!(cache.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_max_age_policy_is_configurable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let endpoint = move |_request: Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Response::new(StatusCode::Ok)
                    .header("Cache-Control", "public")
                    .body("no lifetime")
            }
        };

        let expiring = CacheMiddleware::new();
        let pipeline = Pipeline::new(endpoint.clone()).layer(Arc::new(expiring.clone()));
        fetch(&pipeline, "GET", "/a").await;
        fetch(&pipeline, "GET", "/a").await;
        assert_eq!(expiring.hits(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let lasting = CacheMiddleware::new().missing_max_age(MissingMaxAge::NeverExpires);
        let pipeline = Pipeline::new(endpoint).layer(Arc::new(lasting.clone()));
        fetch(&pipeline, "GET", "/a").await;
        tokio::time::advance(Duration::from_secs(365 * 86_400)).await;
        fetch(&pipeline, "GET", "/a").await;
        assert_eq!(lasting.hits(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn shared_store_serves_other_pipelines() {
        let store = CacheStore::new();
        let warm = CacheMiddleware::new().with_store(store.clone());
        let pipeline = Pipeline::new(|_request| async {
            Response::new(StatusCode::Ok)
                .header("Cache-Control", "public, max-age=60")
                .body("shared")
        })
        .layer(Arc::new(warm));
        fetch(&pipeline, "GET", "/a").await;

        let reader = CacheMiddleware::new().with_store(store);
        let cold = Pipeline::new(|_request| async { Response::new(StatusCode::BadGateway) })
            .layer(Arc::new(reader.clone()));
        assert_eq!(
            fetch(&cold, "GET", "/a").await,
            (StatusCode::Ok, Bytes::from_static(b"shared"))
        );
        assert_eq!(reader.hits(), 1);
    }
}
