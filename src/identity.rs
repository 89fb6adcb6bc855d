//! Identity collaborator.
//!
//! Supplies the current user id, or `None` while unauthenticated. Without
//! an identity the session never connects and the poller skips its ticks.

use std::sync::RwLock;

use tracing::info;

use crate::types::UserId;

/// Source of the authenticated user.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

/// Fixed identity, decided at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<UserId>,
}

impl StaticIdentity {
    pub fn new(user: Option<UserId>) -> Self {
        Self { user }
    }

    pub fn user(user_id: impl Into<UserId>) -> Self {
        Self {
            user: Some(user_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.user.clone()
    }
}

/// Identity that changes on login and logout.
#[derive(Debug, Default)]
pub struct SharedIdentity {
    user: RwLock<Option<UserId>>,
}

impl SharedIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, user_id: UserId) {
        info!(user_id = %user_id, "User logged in");
        // Handle lock poisoning gracefully
        let mut guard = self.user.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(user_id);
    }

    pub fn logout(&self) {
        info!("User logged out");
        let mut guard = self.user.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }
}

impl IdentityProvider for SharedIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.user
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_identity() {
        assert_eq!(
            StaticIdentity::user("user-1").current_user(),
            Some(UserId::new("user-1"))
        );
        assert_eq!(StaticIdentity::anonymous().current_user(), None);
    }

    #[test]
    fn test_shared_identity_login_logout() {
        let identity = SharedIdentity::new();
        assert_eq!(identity.current_user(), None);

        identity.login(UserId::new("user-2"));
        assert_eq!(identity.current_user(), Some(UserId::new("user-2")));

        identity.logout();
        assert_eq!(identity.current_user(), None);
    }
}
