//! Server configuration loaded from environment variables.

/// Runtime configuration for the server process.
///
/// Every setting has a default so the server can start with no environment
/// at all; deployments override via `MSERVE_*` variables.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the listener binds to.
    pub listen_addr: String,
    /// Number of worker tasks consuming the dispatch queue.
    pub pool_size: usize,
    /// Capacity of the dispatch handoff queue.
    pub queue_depth: usize,
    /// Path to the routing-table JSON file.
    pub routes_file: String,
    /// Directory where uploaded blobs are stored.
    pub blob_dir: String,
    /// Document root for the static file service.
    pub www_root: String,
    /// Emit an access-log line per request.
    pub http_log: bool,
    /// Log successful logins.
    pub login_log: bool,
}

impl Config {
    pub fn load() -> Self {
        Self {
            listen_addr: env_str("MSERVE_LISTEN", "0.0.0.0:8080"),
            pool_size: env_num("MSERVE_POOL_SIZE", 4),
            queue_depth: env_num("MSERVE_QUEUE_DEPTH", 128),
            routes_file: env_str("MSERVE_ROUTES", "/etc/mserve/routes.json"),
            blob_dir: env_str("MSERVE_BLOB_DIR", "/var/blobs"),
            www_root: env_str("MSERVE_WWW_ROOT", "/var/www"),
            http_log: env_flag("MSERVE_HTTP_LOG"),
            login_log: env_flag("MSERVE_LOGIN_LOG"),
        }
    }
}

fn env_str(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_num(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}

fn env_flag(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("1") | Ok("true"))
}
