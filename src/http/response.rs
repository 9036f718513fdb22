//! HTTP/1.1 response builder.
//!
//! Provides a fluent builder API for constructing responses and encoding the
//! status line and headers for transmission; the [`Body`] is streamed
//! separately by the transport.

use bytes::{BufMut, BytesMut};

use super::{Body, Headers, StatusCode};

/// How the transport delimits the body on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Content-Length: n`, body written verbatim.
    Length(usize),
    /// `Transfer-Encoding: chunked`, each body chunk framed separately.
    Chunked,
}

/// Everything in a [`Response`] except its body.
#[derive(Debug, Clone)]
pub struct Parts {
    pub status: StatusCode,
    pub headers: Headers,
    pub keep_alive: bool,
}

/// An HTTP/1.1 response.
///
/// # Examples
///
/// ```
/// use respcache::http::{Response, StatusCode};
///
/// let mut response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let head = response.encode_head();
/// let text = std::str::from_utf8(&head).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::empty(),
            keep_alive: true,
        }
    }

    /// Reassembles a response from its parts.
    pub fn from_parts(parts: Parts, body: Body) -> Self {
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
            keep_alive: parts.keep_alive,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place. Intended for middleware that decorates a
    /// downstream response without consuming it.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Splits the response into its head and body.
    pub fn into_parts(self) -> (Parts, Body) {
        (
            Parts {
                status: self.status,
                headers: self.headers,
                keep_alive: self.keep_alive,
            },
            self.body,
        )
    }

    /// Framing the transport will use for the current body.
    pub fn framing(&self) -> Framing {
        match self.body.exact_len() {
            Some(len) => Framing::Length(len),
            None => Framing::Chunked,
        }
    }

    /// Encodes the status line and headers using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body may be non-empty
    ///   and no `Content-Type` header was set.
    /// - `Connection: keep-alive` or `Connection: close`.
    /// - `Content-Length: <n>` for bodies of known length, otherwise
    ///   `Transfer-Encoding: chunked`.
    ///
    /// Framing headers already present on the response are replaced, since the
    /// transport decides framing from the body it is about to write.
    pub fn encode_head(&mut self) -> BytesMut {
        let framing = self.framing();

        if framing != Framing::Length(0) && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);
        self.headers.remove("content-length");
        self.headers.remove("transfer-encoding");

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Framing is always the last header before the blank line.
        match framing {
            Framing::Length(len) => buf.put(format!("Content-Length: {len}\r\n").as_bytes()),
            Framing::Chunked => buf.put(&b"Transfer-Encoding: chunked\r\n"[..]),
        }

        buf.put(&b"\r\n"[..]);
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
