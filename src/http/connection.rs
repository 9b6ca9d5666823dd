//! Per-connection request/response cycle.

use crate::backend::Backends;
use crate::http::parser;
use crate::http::request::Request;
use crate::http::response::WriteOutcome;
use crate::server::pool::PoolHandle;
use std::io::ErrorKind;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// One accepted socket and the request state machine driving it.
///
/// The connection task owns the [`Request`] while reading and writing;
/// during dispatch, ownership moves through the worker pool queue and comes
/// back on the completion channel, so reads, dispatch and writes for a
/// single connection can never overlap or reorder.
pub struct Connection {
    stream: TcpStream,
    peer_ip: String,
    req: Request,
    pool: PoolHandle,
    backends: Backends,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_ip: String, pool: PoolHandle, backends: Backends) -> Self {
        let req = Request::new(peer_ip.clone());
        Self { stream, peer_ip, req, pool, backends }
    }

    /// Drive the connection until the peer hangs up, an I/O error occurs,
    /// or the server shuts down.
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            if !self.read_request().await? {
                return Ok(()); // peer closed
            }

            let req = std::mem::take(&mut self.req);
            let Some(req) = self.pool.dispatch(req).await else {
                return Ok(()); // pool shut down
            };
            self.req = req;

            self.write_response().await?;

            // reset for the next pipelined request on the same socket
            self.req.clear();
        }
    }

    /// Read until the parser reports a dispatchable request.
    ///
    /// Returns `Ok(false)` on orderly EOF from the peer.
    async fn read_request(&mut self) -> anyhow::Result<bool> {
        let mut chunk = [0u8; 8192];
        loop {
            let n = match self.stream.read(&mut chunk).await {
                Ok(0) => return Ok(false),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(remote_ip = %self.peer_ip, error = %e, "read error");
                    return Err(e.into());
                }
            };
            if self.req.payload.is_empty() {
                // first packet of a request; may be overridden by
                // x-forwarded-for during header parsing
                self.req.remote_ip = self.peer_ip.clone();
            }
            if parser::feed(&mut self.req, &chunk[..n], self.backends.blobs.as_ref()) {
                return Ok(true);
            }
        }
    }

    /// Drain the response buffer under write readiness, resuming after
    /// partial writes until everything is on the wire.
    async fn write_response(&mut self) -> anyhow::Result<()> {
        loop {
            self.stream.writable().await?;
            match self.req.response.write_to(&self.stream) {
                Ok(WriteOutcome::Drained) => return Ok(()),
                Ok(WriteOutcome::WouldBlock) => continue,
                Err(e) => {
                    tracing::error!(remote_ip = %self.peer_ip, error = %e, "send error");
                    return Err(e.into());
                }
            }
        }
    }
}
