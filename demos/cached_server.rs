//! Serves a slow, cachable endpoint behind the response cache.
//!
//! ```text
//! RUST_LOG=respcache=debug cargo run --example cached_server
//! curl -i http://127.0.0.1:8080/time      # slow, miss
//! curl -i http://127.0.0.1:8080/time      # instant, hit
//! curl -i http://127.0.0.1:8080/private   # never cached
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use respcache::cache::CacheMiddleware;
use respcache::middleware::LoggerMiddleware;
use respcache::{Pipeline, Request, Response, Server, StatusCode};
use tracing_subscriber::EnvFilter;

async fn upstream(request: Request) -> Response {
    // Simulated backend latency so hits are easy to spot.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    match request.path() {
        "/time" => Response::new(StatusCode::Ok)
            .header("Cache-Control", "public, max-age=10")
            .body(format!("generated at {now}\n")),
        "/private" => Response::new(StatusCode::Ok)
            .header("Cache-Control", "private")
            .body(format!("for you only, at {now}\n")),
        _ => Response::new(StatusCode::NotFound).body("not found\n"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pipeline = Pipeline::new(upstream)
        .layer(Arc::new(LoggerMiddleware))
        .layer(Arc::new(CacheMiddleware::new()));

    let server = Server::bind("127.0.0.1:8080").await?;
    println!("Listening on http://{}", server.local_addr());
    server.serve(pipeline).await?;
    Ok(())
}
