//! Credential verification collaborator.

use anyhow::Result;

/// Profile returned for an authenticated user.
#[derive(Clone, Debug)]
pub struct UserInfo {
    pub email: String,
    pub display_name: String,
    pub roles: String,
}

pub trait LoginProvider: Send + Sync {
    /// Verify credentials. `Ok(None)` means invalid login/password;
    /// `Err` means the provider itself failed (treated as a runtime error).
    fn authenticate(&self, login: &str, password: &str) -> Result<Option<UserInfo>>;
}

/// Default provider for deployments without a login database: every
/// attempt is refused.
pub struct RejectAllLogin;

impl LoginProvider for RejectAllLogin {
    fn authenticate(&self, _login: &str, _password: &str) -> Result<Option<UserInfo>> {
        Ok(None)
    }
}
