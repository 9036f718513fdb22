//! # respcache
//!
//! In-memory HTTP response caching middleware, with the small async HTTP/1.1
//! stack it runs on.
//!
//! Responses to `GET` and `HEAD` requests that carry `Cache-Control: public`
//! are captured while they stream to the client and replayed for later
//! requests with the same authority, method and path until their `max-age`
//! runs out.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use respcache::{Pipeline, Response, Server, StatusCode};
//! use respcache::cache::CacheMiddleware;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(|_req| async {
//!         Response::new(StatusCode::Ok)
//!             .header("Cache-Control", "public, max-age=60")
//!             .body("Hello, World!")
//!     })
//!     .layer(Arc::new(CacheMiddleware::new()));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     println!("Listening on http://{}", server.local_addr());
//!     server.serve(pipeline).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod http;
pub mod middleware;
pub mod server;

pub use cache::{CacheMiddleware, CacheStore};
pub use http::{Body, BodyError, Headers, Method, Request, Response, StatusCode};
pub use middleware::{Middleware, Next, Pipeline};
pub use server::{Server, ServerError};
