//! External collaborators consumed by the dispatch engine.
//!
//! The engine only ever talks to these narrow trait interfaces; the default
//! implementations shipped here are deliberately small (in-memory session
//! store, filesystem blob store, log-backed audit and mail sinks). A real
//! deployment swaps in database-backed implementations without touching the
//! core.

pub mod audit;
pub mod blob;
pub mod login;
pub mod mailer;
pub mod session;
pub mod sql;

pub use audit::{AuditSink, LogAudit};
pub use blob::{BlobStore, FileBlobStore};
pub use login::{LoginProvider, RejectAllLogin, UserInfo};
pub use mailer::{LogMailer, MailMessage, Mailer};
pub use session::{MemorySessionStore, SessionStore, SessionUser};
pub use sql::{SqlBackend, UnconfiguredSql};

use std::sync::Arc;

/// Bundle of collaborator handles shared by every worker.
///
/// Passed by `Arc` instead of living in thread-local storage so ownership
/// and lifetimes stay explicit.
#[derive(Clone)]
pub struct Backends {
    pub sql: Arc<dyn SqlBackend>,
    pub sessions: Arc<dyn SessionStore>,
    pub login: Arc<dyn LoginProvider>,
    pub audit: Arc<dyn AuditSink>,
    pub mailer: Arc<dyn Mailer>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Backends {
    /// Default collaborator set for a standalone server.
    pub fn standalone(blob_dir: &str) -> Self {
        Self {
            sql: Arc::new(UnconfiguredSql),
            sessions: Arc::new(MemorySessionStore::new()),
            login: Arc::new(RejectAllLogin),
            audit: Arc::new(LogAudit),
            mailer: Arc::new(LogMailer),
            blobs: Arc::new(FileBlobStore::new(blob_dir)),
        }
    }
}
