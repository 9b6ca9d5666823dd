use mserve::backend::Backends;
use mserve::config::Config;
use mserve::dispatch::engine::Engine;
use mserve::dispatch::routes::RouteTable;
use mserve::server;
use mserve::server::pool::WorkerPool;
use mserve::server::stats::ServerStats;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load();

    let routes = match RouteTable::load(&cfg.routes_file) {
        Ok(routes) => Arc::new(routes),
        Err(e) => {
            tracing::error!("cannot load routing table from {}: {e:#}", cfg.routes_file);
            std::process::exit(1);
        }
    };
    tracing::info!(services = routes.len(), "routing table loaded");

    let backends = Backends::standalone(&cfg.blob_dir);
    let stats = Arc::new(ServerStats::new());
    let engine = Engine::new(
        routes,
        backends.clone(),
        stats.clone(),
        cfg.www_root.clone(),
        cfg.http_log,
        cfg.login_log,
    );
    let pool = WorkerPool::start(cfg.pool_size, cfg.queue_depth, engine);

    tokio::select! {
        res = server::listener::run(&cfg.listen_addr, pool.handle(), backends, stats) => {
            res?;
        }

        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
    }

    pool.shutdown().await;
    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on ctrl-c, SIGTERM or SIGQUIT.
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("cannot install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    let mut quit = match signal(SignalKind::quit()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("cannot install SIGQUIT handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
        _ = quit.recv() => {}
    }
}
