use async_trait::async_trait;
use tokio::sync::watch;

use super::principal::Principal;
use crate::error::AppResult;

/// Push stream of authentication state. Holds the latest value only: a slow reader skips
/// straight to the newest principal.
pub type AuthStream = watch::Receiver<Option<Principal>>;

/// Publisher side of the auth stream, shared by provider implementations.
#[derive(Debug)]
pub struct AuthChannel {
    tx: watch::Sender<Option<Principal>>,
}

impl Default for AuthChannel {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }
}

impl AuthChannel {
    /// Fires on sign-in, sign-out and token refresh.
    pub fn publish(&self, principal: Option<Principal>) {
        self.tx.send_replace(principal);
    }

    pub fn subscribe(&self) -> AuthStream { self.tx.subscribe() }

    pub fn current(&self) -> Option<Principal> { self.tx.borrow().clone() }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sign in the primary session; publishes the principal on success.
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Principal>;

    /// Sign out the primary session; publishes `None`.
    async fn sign_out(&self) -> AppResult<()>;

    /// Exchange the primary session's refresh credential for a new token and republish.
    async fn refresh(&self) -> AppResult<Principal>;

    fn current(&self) -> Option<Principal>;

    fn subscribe(&self) -> AuthStream;

    /// Create a new account in an isolated session. The primary session and the auth stream
    /// are untouched.
    async fn provision(&self, email: &str, password: &str) -> AppResult<Box<dyn ProvisioningSession>>;

    /// Delete the account that owns `id_token`, via the provider's raw account API.
    async fn delete_account(&self, id_token: &str) -> AppResult<()>;

    async fn send_password_reset(&self, email: &str) -> AppResult<()>;
}

/// Transient session for a freshly provisioned account. Must be signed out once the account's
/// records are written.
#[async_trait]
pub trait ProvisioningSession: Send {
    fn uid(&self) -> &str;

    fn is_active(&self) -> bool;

    async fn id_token(&mut self) -> AppResult<String>;

    /// Idempotent.
    async fn sign_out(&mut self) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_keeps_only_latest() {
        let ch = AuthChannel::default();
        let mut rx = ch.subscribe();
        ch.publish(Some(Principal { uid: "a".into(), ..Default::default() }));
        ch.publish(Some(Principal { uid: "b".into(), ..Default::default() }));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().map(|p| p.uid.clone()), Some("b".to_string()));
        assert_eq!(ch.current().unwrap().uid, "b");
        ch.publish(None);
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }
}
