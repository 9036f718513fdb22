//! Streaming response bodies.
//!
//! A [`Body`] is a finite, single-pass sequence of byte chunks. It is either
//! fully materialized (a single [`Bytes`] buffer) or backed by an arbitrary
//! [`Stream`] produced by an upstream handler. Either way the transport drains
//! it exactly once through the [`Stream`] implementation.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use thiserror::Error;

/// Errors surfaced while a body is being streamed.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("I/O error while streaming body: {0}")]
    Io(#[from] std::io::Error),

    #[error("upstream body failed: {message}")]
    Upstream { message: String },
}

impl BodyError {
    /// Convenience constructor for handler-side failures.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }
}

/// A single-pass HTTP message body.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use futures_util::stream;
/// use respcache::http::{Body, BodyError};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let full = Body::from("hello");
/// assert_eq!(full.exact_len(), Some(5));
///
/// let chunks = stream::iter(vec![
///     Ok::<_, BodyError>(Bytes::from_static(b"hel")),
///     Ok(Bytes::from_static(b"lo")),
/// ]);
/// let streamed = Body::from_stream(chunks);
/// assert_eq!(streamed.exact_len(), None);
/// assert_eq!(streamed.collect().await.unwrap(), "hello");
/// # });
/// ```
pub struct Body {
    kind: Kind,
    // Known total length, used for `Content-Length` framing.
    len: Option<usize>,
}

enum Kind {
    // `None` once the single chunk has been yielded.
    Full(Option<Bytes>),
    Stream(BoxStream<'static, Result<Bytes, BodyError>>),
}

impl Body {
    /// An empty body.
    pub fn empty() -> Self {
        Self::full(Bytes::new())
    }

    /// A body backed by an in-memory buffer.
    pub fn full(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            len: Some(bytes.len()),
            kind: Kind::Full(Some(bytes)),
        }
    }

    /// A body backed by a chunk stream of unknown total length.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BodyError>> + Send + 'static,
    {
        Self::sized_stream(stream, None)
    }

    /// A body backed by a chunk stream whose total length is known up front.
    ///
    /// The length is trusted as-is and used for `Content-Length` framing.
    pub fn sized_stream<S>(stream: S, len: Option<usize>) -> Self
    where
        S: Stream<Item = Result<Bytes, BodyError>> + Send + 'static,
    {
        Self {
            kind: Kind::Stream(stream.boxed()),
            len,
        }
    }

    /// Total length in bytes, when known without draining the body.
    pub fn exact_len(&self) -> Option<usize> {
        self.len
    }

    /// Drains the body into a single contiguous buffer.
    ///
    /// # Errors
    ///
    /// Returns the first [`BodyError`] the underlying stream yields.
    pub async fn collect(self) -> Result<Bytes, BodyError> {
        match self.kind {
            Kind::Full(bytes) => Ok(bytes.unwrap_or_default()),
            Kind::Stream(mut stream) => {
                let mut buf = BytesMut::with_capacity(self.len.unwrap_or(0));
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl Stream for Body {
    type Item = Result<Bytes, BodyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.kind {
            // An empty buffer ends the stream without yielding a zero-length chunk.
            Kind::Full(bytes) => Poll::Ready(bytes.take().filter(|b| !b.is_empty()).map(Ok)),
            Kind::Stream(stream) => stream.as_mut().poll_next(cx),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            Kind::Full(_) => "full",
            Kind::Stream(_) => "stream",
        };
        f.debug_struct("Body")
            .field("kind", &kind)
            .field("len", &self.len)
            .finish()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::full(bytes)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::full(s)
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self::full(Bytes::from_static(s.as_bytes()))
    }
}
