//! Server runtime: accept loop, worker pool, process counters.

pub mod listener;
pub mod pool;
pub mod stats;
