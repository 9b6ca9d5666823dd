//! Process-wide counters backing the server-info and metrics services.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// Shared counters, passed around by `Arc` instead of living in globals.
pub struct ServerStats {
    started_on: String,
    requests: AtomicU64,
    total_micros: AtomicU64,
    active_workers: AtomicI64,
    connections: AtomicI64,
}

/// Point-in-time copy of all counters.
pub struct StatsSnapshot {
    pub started_on: String,
    pub requests: u64,
    /// Average request processing time in seconds.
    pub avg_time: f64,
    pub connections: i64,
    pub active_workers: i64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started_on: httpdate::fmt_http_date(SystemTime::now()),
            requests: AtomicU64::new(0),
            total_micros: AtomicU64::new(0),
            active_workers: AtomicI64::new(0),
            connections: AtomicI64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_finished(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_request(&self, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_micros = self.total_micros.load(Ordering::Relaxed);
        let avg_time = if requests > 0 {
            (total_micros as f64 / requests as f64) / 1_000_000.0
        } else {
            0.0
        };
        StatsSnapshot {
            started_on: self.started_on.clone(),
            requests,
            avg_time,
            connections: self.connections.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::Relaxed),
        }
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Pod/host name for info and metrics payloads.
pub fn hostname() -> String {
    if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        return name.trim().to_string();
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}
