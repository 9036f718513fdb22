//! Body tee used on cache misses.
//!
//! [`CaptureBody`] sits between the transport and an upstream body. Every
//! chunk is passed through untouched and also appended to a buffer; when the
//! upstream stream ends the completion hook receives the buffered copy.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::Stream;

use crate::http::{Body, BodyError};

type OnComplete = Box<dyn FnOnce(Bytes) + Send>;

/// Wraps `body` so that its full contents are handed to `on_complete` once the
/// consumer has drained it.
///
/// The returned [`Body`] keeps the original's known length, so framing on the
/// wire is unchanged. `on_complete` runs at most once, and only after the
/// inner stream signalled its end; an error chunk or dropping the body early
/// discards it.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use respcache::cache::capture;
/// use respcache::http::Body;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let seen = Arc::new(Mutex::new(None));
/// let sink = Arc::clone(&seen);
/// let body = capture(Body::from("payload"), move |copy| {
///     *sink.lock().unwrap() = Some(copy);
/// });
///
/// assert_eq!(body.collect().await.unwrap(), "payload");
/// assert_eq!(seen.lock().unwrap().as_deref(), Some(&b"payload"[..]));
/// # });
/// ```
pub fn capture<F>(body: Body, on_complete: F) -> Body
where
    F: FnOnce(Bytes) + Send + 'static,
{
    let len = body.exact_len();
    Body::sized_stream(CaptureBody::new(body, on_complete), len)
}

/// Stream decorator behind [`capture`].
pub struct CaptureBody {
    inner: Body,
    buffer: BytesMut,
    // Taken when fired; cleared on error so nothing partial is ever reported.
    on_complete: Option<OnComplete>,
}

impl CaptureBody {
    pub fn new<F>(inner: Body, on_complete: F) -> Self
    where
        F: FnOnce(Bytes) + Send + 'static,
    {
        let buffer = BytesMut::with_capacity(inner.exact_len().unwrap_or(0));
        Self {
            inner,
            buffer,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    /// `true` until the hook has fired or been discarded.
    pub fn is_pending(&self) -> bool {
        self.on_complete.is_some()
    }
}

impl Stream for CaptureBody {
    type Item = Result<Bytes, BodyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if this.on_complete.is_some() {
                    this.buffer.extend_from_slice(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.on_complete = None;
                this.buffer = BytesMut::new();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(on_complete) = this.on_complete.take() {
                    on_complete(this.buffer.split().freeze());
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for CaptureBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureBody")
            .field("inner", &self.inner)
            .field("buffered", &self.buffer.len())
            .field("pending", &self.is_pending())
            .finish()
    }
}
