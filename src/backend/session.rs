//! Security session collaborator.
//!
//! Session ids have the form `<numeric-id>-<opaque-token>`; the numeric part
//! keys the store, the token guards against guessing.

use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Identity resolved from a valid session.
#[derive(Clone, Debug)]
pub struct SessionUser {
    pub login: String,
    pub mail: String,
    pub roles: String,
}

pub trait SessionStore: Send + Sync {
    /// Create a session and return its id, or `None` on failure.
    fn create(&self, login: &str, mail: &str, ip: &str, roles: &str) -> Option<String>;

    /// Resolve and touch a session. `None` means expired/unknown/malformed.
    fn update(&self, session_id: &str) -> Option<SessionUser>;

    /// Drop a session. Unknown ids are ignored.
    fn remove(&self, session_id: &str);

    /// Number of live sessions.
    fn count(&self) -> usize;
}

struct Entry {
    token: String,
    user: SessionUser,
}

/// In-memory session store for standalone deployments and tests.
pub struct MemorySessionStore {
    inner: Mutex<MemoryInner>,
}

struct MemoryInner {
    next_id: u64,
    entries: HashMap<u64, Entry>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                next_id: 1,
                entries: HashMap::new(),
            }),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `<id>-<token>` into its parts.
fn split_session_id(session_id: &str) -> Option<(u64, &str)> {
    let (id, token) = session_id.split_once('-')?;
    let id = id.parse().ok()?;
    Some((id, token))
}

impl SessionStore for MemorySessionStore {
    fn create(&self, login: &str, mail: &str, _ip: &str, roles: &str) -> Option<String> {
        let mut inner = self.inner.lock().ok()?;
        let id = inner.next_id;
        inner.next_id += 1;
        let token = Uuid::new_v4().to_string();
        inner.entries.insert(
            id,
            Entry {
                token: token.clone(),
                user: SessionUser {
                    login: login.to_string(),
                    mail: mail.to_string(),
                    roles: roles.to_string(),
                },
            },
        );
        Some(format!("{id}-{token}"))
    }

    fn update(&self, session_id: &str) -> Option<SessionUser> {
        let (id, token) = split_session_id(session_id)?;
        let inner = self.inner.lock().ok()?;
        let entry = inner.entries.get(&id)?;
        if entry.token != token {
            return None;
        }
        Some(entry.user.clone())
    }

    fn remove(&self, session_id: &str) {
        let Some((id, _)) = split_session_id(session_id) else {
            tracing::error!(session_id, "malformed session id passed to remove");
            return;
        };
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.remove(&id);
        }
    }

    fn count(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }
}
