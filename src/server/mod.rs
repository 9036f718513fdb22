//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler
//! function or a [`Pipeline`]. Supports persistent connections (keep-alive)
//! and streams response bodies as they are produced.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    Method, StatusCode,
    request::{Request, RequestError},
    response::{Framing, Response},
};
use crate::middleware::Pipeline;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The HTTP/1.1 front end that hosts a middleware pipeline.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use respcache::{Pipeline, Response, Server, StatusCode};
/// use respcache::cache::CacheMiddleware;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(|_req| async {
///         Response::new(StatusCode::Ok)
///             .header("Cache-Control", "public, max-age=30")
///             .body("Hello!")
///     })
///     .layer(Arc::new(CacheMiddleware::new()));
///
///     Server::bind("127.0.0.1:8080").await?.serve(pipeline).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Dispatches every request through `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, pipeline: Pipeline) -> Result<(), ServerError> {
        self.run(move |request| pipeline.handle(request)).await
    }

    /// Starts accepting connections and dispatching requests to `handler`.
    ///
    /// The handler is wrapped in an [`Arc`] and shared across all spawned
    /// Tokio tasks, so it must be `Send + Sync + 'static`. Runs until the
    /// process is terminated.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        // Pipelined bytes left over from the previous request may already
        // hold a complete request; only read when they do not.
        let parsed = if buf.is_empty() {
            None
        } else {
            match Request::parse(&buf) {
                Ok(pair) => Some(pair),
                Err(RequestError::Incomplete) => None,
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                    let response = Response::new(StatusCode::BadRequest)
                        .body(format!("Bad Request: {e}"))
                        .keep_alive(false);
                    write_response(&mut stream, response, false).await?;
                    break;
                }
            }
        };

        let (request, body_offset) = match parsed {
            Some(pair) => pair,
            None => {
                if stream.read_buf(&mut buf).await? == 0 {
                    debug!(peer = %peer_addr, "connection closed by peer");
                    break;
                }
                if buf.len() > MAX_REQUEST_SIZE {
                    warn!(peer = %peer_addr, "request too large — sending 413");
                    write_response(&mut stream, payload_too_large(), false).await?;
                    break;
                }
                continue;
            }
        };

        // The declared length is checked before any body bytes are buffered.
        let total_needed = request
            .content_length()
            .unwrap_or(0)
            .checked_add(body_offset)
            .filter(|&total| total <= MAX_REQUEST_SIZE);
        let Some(total_needed) = total_needed else {
            warn!(peer = %peer_addr, "declared body too large — sending 413");
            write_response(&mut stream, payload_too_large(), false).await?;
            break;
        };

        // Wait for the full body to arrive if Content-Length is set.
        if buf.len() < total_needed {
            if stream.read_buf(&mut buf).await? == 0 {
                break;
            }
            continue;
        }

        let keep_alive = request.is_keep_alive();
        let head_only = matches!(request.method(), Method::Head);

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let mut response = handler(request).await;
        response.set_keep_alive(keep_alive);
        write_response(&mut stream, response, head_only).await?;

        // Drop the consumed request bytes from the buffer.
        buf.advance(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            break;
        }
    }

    Ok(())
}

fn payload_too_large() -> Response {
    Response::new(StatusCode::PayloadTooLarge)
        .body("Request entity too large")
        .keep_alive(false)
}

/// Writes the head, then streams the body with the framing the head announced.
///
/// With `head_only` (a response to `HEAD`) the body is still drained, so
/// wrappers observing it see it complete, but none of it reaches the wire.
///
/// A body that fails mid-stream aborts the connection: the peer sees a
/// truncated message rather than a complete one.
async fn write_response(
    stream: &mut TcpStream,
    mut response: Response,
    head_only: bool,
) -> std::io::Result<()> {
    let framing = response.framing();
    stream.write_all(&response.encode_head()).await?;

    let mut body = response.into_body();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(std::io::Error::other)?;
        if head_only || chunk.is_empty() {
            continue;
        }
        match framing {
            Framing::Length(_) => stream.write_all(&chunk).await?,
            Framing::Chunked => {
                stream
                    .write_all(format!("{:X}\r\n", chunk.len()).as_bytes())
                    .await?;
                stream.write_all(&chunk).await?;
                stream.write_all(b"\r\n").await?;
            }
        }
    }

    if framing == Framing::Chunked && !head_only {
        stream.write_all(b"0\r\n\r\n").await?;
    }
    stream.flush().await
}
