//! HTTP protocol implementation.
//!
//! A self-contained HTTP/1.1 subset: GET and POST, content-length bodies,
//! multipart/form-data uploads, keep-alive pipelining. No external HTTP
//! library is involved; the dispatch model only needs this much.
//!
//! # Architecture
//!
//! - **`request`**: per-socket parse state and the parameters extracted
//!   from it
//! - **`parser`**: incremental state machine turning raw bytes into a
//!   dispatchable request
//! - **`multipart`**: multipart/form-data decoding with blob persistence
//!   for file parts
//! - **`response`**: append-only response buffer with a resumable write
//!   cursor, plus reply serialization with the fixed header set
//! - **`connection`**: the per-socket task tying it all together
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Request State Machine
//!
//! ```text
//!   AccumulatingHeaders ──(blank line)──► GET: Complete
//!            │                            POST: AccumulatingBody
//!            │                                      │
//!            ▼                                      ▼
//!        Malformed ◄──(protocol error)──── Complete when body bytes
//!                                          == content-length
//! ```
//!
//! A `Complete` or `Malformed` request is handed to the worker pool; the
//! connection then drains the response buffer and resets the state for the
//! next request on the same socket.

pub mod connection;
pub mod mime;
pub mod multipart;
pub mod parser;
pub mod request;
pub mod response;
