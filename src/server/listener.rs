use crate::backend::Backends;
use crate::http::connection::Connection;
use crate::server::pool::PoolHandle;
use crate::server::stats::ServerStats;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Accept loop: one spawned connection task per accepted socket.
pub async fn run(
    listen_addr: &str,
    pool: PoolHandle,
    backends: Backends,
    stats: Arc<ServerStats>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!("listening on {}", listen_addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        stats.connection_opened();

        let pool = pool.clone();
        let backends = backends.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            let conn = Connection::new(socket, peer.ip().to_string(), pool, backends);
            if let Err(e) = conn.run().await {
                tracing::error!("connection error from {}: {}", peer, e);
            }
            stats.connection_closed();
        });
    }
}
