//! Response buffer with resumable partial-write semantics.

use std::io;
use std::time::SystemTime;
use tokio::net::TcpStream;

/// Outcome of one non-blocking drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every buffered byte has been handed to the socket.
    Drained,
    /// The socket is full; retry on the next writable readiness.
    WouldBlock,
}

/// Append-only byte buffer tracking a separate write cursor so partial
/// socket writes resume exactly where they stopped.
///
/// Bytes before the cursor have been accepted by the kernel and are never
/// sent again.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    buf: Vec<u8>,
    cursor: usize,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(8192), cursor: 0 }
    }

    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn push_str(&mut self, data: &str) {
        self.buf.extend_from_slice(data.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes not yet accepted by the socket.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    /// Advance the cursor by `n` sent bytes.
    pub fn advance(&mut self, n: usize) {
        self.cursor = (self.cursor + n).min(self.buf.len());
    }

    pub fn is_drained(&self) -> bool {
        self.cursor == self.buf.len()
    }

    /// Reset the buffer for the next request on the same connection.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.cursor = 0;
    }

    /// Attempt a non-blocking send of the pending bytes.
    ///
    /// Call under write readiness; a `WouldBlock` result means the caller
    /// should wait for the next readiness event. I/O errors other than
    /// `WouldBlock` are fatal for the connection.
    pub fn write_to(&mut self, stream: &TcpStream) -> io::Result<WriteOutcome> {
        while !self.is_drained() {
            match stream.try_write(self.pending()) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteOutcome::WouldBlock);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(WriteOutcome::Drained)
    }
}

/// One fully described HTTP reply, serialized into a [`ResponseBuffer`]
/// with the fixed security/CORS header set.
pub struct Reply<'a> {
    /// Status line remainder, e.g. `"200 OK"`.
    pub status: &'a str,
    pub content_type: &'a str,
    /// Echoed into `Access-Control-Allow-Origin`.
    pub origin: &'a str,
    /// Inbound trace id echoed back as `x-request-id`.
    pub request_id: Option<&'a str>,
    pub set_cookie: Option<&'a str>,
    pub content_disposition: Option<&'a str>,
    pub cache_control: Option<&'a str>,
    pub location: Option<&'a str>,
    pub body: &'a [u8],
}

impl<'a> Reply<'a> {
    pub fn new(status: &'a str, content_type: &'a str, origin: &'a str, body: &'a [u8]) -> Self {
        Self {
            status,
            content_type,
            origin,
            request_id: None,
            set_cookie: None,
            content_disposition: None,
            cache_control: None,
            location: None,
            body,
        }
    }

    /// Serialize status line, headers and body into `res`.
    pub fn write_to(&self, res: &mut ResponseBuffer) {
        res.push_str("HTTP/1.1 ");
        res.push_str(self.status);
        res.push_str("\r\n");
        if let Some(location) = self.location {
            header(res, "Location", location);
        }
        header(res, "Content-Length", &self.body.len().to_string());
        header(res, "Content-Type", self.content_type);
        header(res, "Date", &response_date());
        header(res, "Keep-Alive", "timeout=5, max=200");
        header(res, "Access-Control-Allow-Origin", self.origin);
        header(res, "Access-Control-Allow-Credentials", "true");
        header(res, "Access-Control-Expose-Headers", "content-disposition");
        header(
            res,
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains; preload;",
        );
        header(res, "X-Frame-Options", "SAMEORIGIN");
        if let Some(cache) = self.cache_control {
            header(res, "Cache-Control", cache);
        }
        if let Some(disposition) = self.content_disposition {
            header(res, "Content-Disposition", disposition);
        }
        if let Some(cookie) = self.set_cookie {
            header(res, "Set-Cookie", cookie);
        }
        if let Some(id) = self.request_id {
            header(res, "x-request-id", id);
        }
        res.push_str("\r\n");
        res.append(self.body);
    }
}

fn header(res: &mut ResponseBuffer, name: &str, value: &str) {
    res.push_str(name);
    res.push_str(": ");
    res.push_str(value);
    res.push_str("\r\n");
}

/// RFC 1123 date for the `Date` response header.
fn response_date() -> String {
    httpdate::fmt_http_date(SystemTime::now())
}
