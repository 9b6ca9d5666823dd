//! Audit record collaborator.

pub trait AuditSink: Send + Sync {
    /// Persist one audit record for a dispatched request.
    fn record(&self, path: &str, user: &str, ip: &str, message: &str);
}

/// Default sink: audit records go to the structured log.
pub struct LogAudit;

impl AuditSink for LogAudit {
    fn record(&self, path: &str, user: &str, ip: &str, message: &str) {
        tracing::info!(target: "audit", path, user, remote_ip = ip, "{message}");
    }
}
