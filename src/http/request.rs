//! Per-connection request state.

use crate::http::response::ResponseBuffer;
use bytes::BytesMut;
use std::collections::HashMap;

/// Name of the session cookie issued on login.
pub const SESSION_COOKIE: &str = "MSERVESESSIONID";

/// Parse state machine for one request on a connection.
///
/// `AccumulatingHeaders` until the blank-line separator arrives, then either
/// straight to `Complete` (GET) or through `AccumulatingBody` until
/// content-length bytes have been received (POST). `Malformed` is terminal
/// for the current request and produces a 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    #[default]
    AccumulatingHeaders,
    AccumulatingBody,
    Complete,
    Malformed,
}

/// Everything known about the request currently in flight on a socket.
///
/// Exactly one thread mutates a `Request` at any instant: the connection
/// task while reading and writing, one pool worker while dispatching.
/// Ownership is handed over through the dispatch queue, so no locking is
/// needed on the struct itself.
#[derive(Debug, Default)]
pub struct Request {
    pub remote_ip: String,
    /// Raw inbound bytes accumulated so far.
    pub payload: BytesMut,
    pub state: ParseState,
    /// Offset of the first body byte (one past the blank line).
    pub body_start: usize,
    pub content_length: usize,
    pub method: String,
    pub path: String,
    /// Path plus query, exactly as received.
    pub query_string: String,
    /// Header name (lower-cased) to value.
    pub headers: HashMap<String, String>,
    /// Decoded query/body parameters.
    pub params: HashMap<String, String>,
    /// Session token extracted from the cookie header.
    pub cookie: String,
    /// Request origin; literal `"null"` when absent or empty.
    pub origin: String,
    pub is_multipart: bool,
    pub boundary: String,
    pub errmsg: String,
    pub response: ResponseBuffer,
}

impl Request {
    pub fn new(remote_ip: String) -> Self {
        Self {
            remote_ip,
            origin: "null".to_string(),
            ..Default::default()
        }
    }

    /// Header lookup by lower-cased name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Trace id from the inbound `x-request-id` header, empty if absent.
    pub fn request_id(&self) -> &str {
        self.header("x-request-id").unwrap_or("")
    }

    /// Whether the request is ready to be dispatched (or rejected).
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ParseState::Complete | ParseState::Malformed)
    }

    /// Record a protocol error; terminal for this request.
    pub fn fail(&mut self, msg: impl Into<String>) {
        self.state = ParseState::Malformed;
        if self.errmsg.is_empty() {
            self.errmsg = msg.into();
        }
    }

    /// Reset to the empty state, keeping the socket open for the next
    /// pipelined request. The remote ip survives; everything else is wiped.
    pub fn clear(&mut self) {
        self.payload.clear();
        self.state = ParseState::AccumulatingHeaders;
        self.body_start = 0;
        self.content_length = 0;
        self.method.clear();
        self.path.clear();
        self.query_string.clear();
        self.headers.clear();
        self.params.clear();
        self.cookie.clear();
        self.origin = "null".to_string();
        self.is_multipart = false;
        self.boundary.clear();
        self.errmsg.clear();
        self.response.clear();
    }
}
