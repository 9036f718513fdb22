//! Middleware pipeline — composable before/after request handler logic.
//!
//! Each middleware wraps the next layer, enabling request inspection,
//! short-circuit responses (a cache hit is one) and response decoration
//! without coupling the upstream handler to infrastructure concerns.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to forward
//!   the request to the next layer, and eventually to the upstream endpoint.
//! - [`Pipeline`] — an ordered middleware stack in front of an endpoint.
//! - [`LoggerMiddleware`] — built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, StatusCode};

/// Boxed, sendable response future returned by every layer.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A type-erased, reference-counted middleware function.
///
/// Construct one with [`from_middleware`] or by wrapping a closure directly:
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use respcache::middleware::{MiddlewareHandler, Next, ResponseFuture};
/// use respcache::Request;
///
/// let handler: MiddlewareHandler = Arc::new(|request: Request, next: Next| -> ResponseFuture {
///     Box::pin(async move { next.run(request).await })
/// });
/// ```
pub type MiddlewareHandler = Arc<dyn Fn(Request, Next) -> ResponseFuture + Send + Sync + 'static>;

/// The terminal upstream handler of a pipeline.
pub type Endpoint = Arc<dyn Fn(Request) -> ResponseFuture + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use respcache::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |request: Request, next: Next| middleware.handle(request, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a middleware can forward a
/// request at most once.
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
    endpoint: Option<Endpoint>,
}

impl Next {
    /// Creates a cursor over `middlewares` with no endpoint behind them.
    ///
    /// If the chain is exhausted without a response, [`run`](Self::run)
    /// answers `500 Internal Server Error`.
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            index: 0,
            endpoint: None,
        }
    }

    /// Creates a cursor that falls through to `endpoint` after the last middleware.
    pub fn with_endpoint(middlewares: Vec<MiddlewareHandler>, endpoint: Endpoint) -> Self {
        Self {
            middlewares,
            index: 0,
            endpoint: Some(endpoint),
        }
    }

    /// Invokes the next middleware, or the endpoint once the chain is exhausted.
    pub async fn run(mut self, request: Request) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(request, self).await
        } else if let Some(endpoint) = self.endpoint.take() {
            endpoint(request).await
        } else {
            Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline")
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive the [`Request`] and a [`Next`] cursor. They may pass
/// the request through, short-circuit with their own [`Response`], or
/// decorate the downstream response.
///
/// Implementations must be `Send + Sync` because middleware is shared across
/// Tokio tasks, and must not hold locks on shared state across an `.await`.
pub trait Middleware: Send + Sync {
    fn handle(&self, request: Request, next: Next) -> ResponseFuture;
}

/// An ordered middleware stack in front of an upstream endpoint.
///
/// Middleware runs in the order it was added with [`layer`](Self::layer); the
/// first layer sees the request first and the response last. Cloning is
/// cheap and shares every layer.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use respcache::{Pipeline, Response, StatusCode};
/// use respcache::cache::CacheMiddleware;
/// use respcache::middleware::LoggerMiddleware;
///
/// let pipeline = Pipeline::new(|_request| async {
///     Response::new(StatusCode::Ok)
///         .header("Cache-Control", "public, max-age=60")
///         .body("hello")
/// })
/// .layer(Arc::new(LoggerMiddleware))
/// .layer(Arc::new(CacheMiddleware::new()));
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Vec<MiddlewareHandler>,
    endpoint: Endpoint,
}

impl Pipeline {
    /// Creates a pipeline with no middleware in front of `endpoint`.
    pub fn new<H, F>(endpoint: H) -> Self
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let endpoint: Endpoint =
            Arc::new(move |request: Request| -> ResponseFuture { Box::pin(endpoint(request)) });
        Self {
            middlewares: Vec::new(),
            endpoint,
        }
    }

    /// Appends `middleware` as the innermost layer so far.
    #[must_use]
    pub fn layer<M>(mut self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        self.middlewares.push(from_middleware(middleware));
        self
    }

    /// Number of middleware layers (the endpoint is not counted).
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs `request` through every layer and the endpoint.
    ///
    /// The returned future owns its handles, so it can be spawned or returned
    /// from a server handler directly.
    pub fn handle(&self, request: Request) -> ResponseFuture {
        let next = Next::with_endpoint(self.middlewares.clone(), Arc::clone(&self.endpoint));
        Box::pin(next.run(request))
    }
}

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// Emits a single `tracing::info!` line after the downstream handler
/// completes. For a streamed miss the duration covers producing the response
/// head only, not draining its body.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, request: Request, next: Next) -> ResponseFuture {
        Box::pin(async move {
            let start = Instant::now();
            let method = request.method().as_str().to_string();
            let path = request.path().to_string();

            let response = next.run(request).await;

            let duration = start.elapsed();
            let status = response.status().as_u16();

            tracing::info!("{} {} - {} ({:?})", method, path, status, duration);

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    // Records its name on the way in and tags the response on the way out.
    struct Trace {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for Trace {
        fn handle(&self, request: Request, next: Next) -> ResponseFuture {
            let name = self.name;
            let log = Arc::clone(&self.log);
            Box::pin(async move {
                log.lock().unwrap().push(name);
                let mut response = next.run(request).await;
                response.add_header("X-Trace", name);
                response
            })
        }
    }

    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        fn handle(&self, _request: Request, _next: Next) -> ResponseFuture {
            Box::pin(async { Response::new(StatusCode::Forbidden) })
        }
    }

    #[tokio::test]
    async fn layers_run_in_order_around_endpoint() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let endpoint_log = Arc::clone(&log);
        let pipeline = Pipeline::new(move |_request| {
            let log = Arc::clone(&endpoint_log);
            async move {
                log.lock().unwrap().push("endpoint");
                Response::new(StatusCode::Ok)
            }
        })
        .layer(Arc::new(Trace {
            name: "outer",
            log: Arc::clone(&log),
        }))
        .layer(Arc::new(Trace {
            name: "inner",
            log: Arc::clone(&log),
        }));

        assert_eq!(pipeline.len(), 2);
        let response = pipeline.handle(make_request("GET", "/")).await;

        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner", "endpoint"]);
        let tags: Vec<_> = response.headers().get_all("x-trace").collect();
        assert_eq!(tags, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_endpoint() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pipeline = Pipeline::new(move |_request| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Response::new(StatusCode::Ok) }
        })
        .layer(Arc::new(ShortCircuit));

        let response = pipeline.handle(make_request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::Forbidden);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_without_endpoint_is_500() {
        let response = Next::new(Vec::new()).run(make_request("GET", "/")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let pipeline = Pipeline::new(|_request| async { Response::new(StatusCode::Accepted) })
            .layer(Arc::new(LoggerMiddleware));
        let response = pipeline.handle(make_request("POST", "/jobs")).await;
        assert_eq!(response.status(), StatusCode::Accepted);
    }
}
