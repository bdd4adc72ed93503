//! In-process identity provider. Accounts and tokens live in memory; used for offline runs and
//! throughout the test suite.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::principal::Principal;
use super::provider::{AuthChannel, AuthStream, IdentityProvider, ProvisioningSession};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    email: String,
    password: String,
}

#[derive(Debug, Default)]
struct Inner {
    // keyed by lowercase email
    accounts: RwLock<HashMap<String, Account>>,
    // token -> uid
    tokens: RwLock<HashMap<String, String>>,
    resets: Mutex<Vec<String>>,
}

impl Inner {
    fn issue_token(&self, uid: &str) -> String {
        let token = format!("mem-{}", uuid::Uuid::new_v4().simple());
        self.tokens.write().insert(token.clone(), uid.to_string());
        token
    }

    fn create(&self, email: &str, password: &str) -> AppResult<Account> {
        let key = email.to_lowercase();
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&key) {
            return Err(AppError::auth("email_exists", "The email address is already in use by another account."));
        }
        let account = Account {
            uid: uuid::Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        accounts.insert(key, account.clone());
        Ok(account)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryIdentity {
    inner: Arc<Inner>,
    auth: Arc<AuthChannel>,
}

impl MemoryIdentity {
    pub fn new() -> Self { Self::default() }

    /// Register an account directly, returning its identifier.
    pub fn add_account(&self, email: &str, password: &str) -> AppResult<String> {
        Ok(self.inner.create(email, password)?.uid)
    }

    pub fn has_account(&self, email: &str) -> bool {
        self.inner.accounts.read().contains_key(&email.to_lowercase())
    }

    pub fn account_count(&self) -> usize { self.inner.accounts.read().len() }

    /// Emails for which a password reset was requested, in order.
    pub fn reset_requests(&self) -> Vec<String> { self.inner.resets.lock().clone() }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Principal> {
        let account = self.inner.accounts.read().get(&email.to_lowercase()).cloned();
        let Some(account) = account.filter(|a| a.password == password) else {
            return Err(AppError::auth("invalid_login_credentials", "Invalid credentials"));
        };
        let principal = Principal {
            id_token: self.inner.issue_token(&account.uid),
            uid: account.uid,
            email: account.email,
        };
        self.auth.publish(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.auth.publish(None);
        Ok(())
    }

    async fn refresh(&self) -> AppResult<Principal> {
        let Some(mut principal) = self.auth.current() else {
            return Err(AppError::auth("not_signed_in", "No signed-in session to refresh"));
        };
        principal.id_token = self.inner.issue_token(&principal.uid);
        self.auth.publish(Some(principal.clone()));
        Ok(principal)
    }

    fn current(&self) -> Option<Principal> { self.auth.current() }

    fn subscribe(&self) -> AuthStream { self.auth.subscribe() }

    async fn provision(&self, email: &str, password: &str) -> AppResult<Box<dyn ProvisioningSession>> {
        let account = self.inner.create(email, password)?;
        debug!(target: "ispdesk::identity", "memory.provision uid={}", account.uid);
        Ok(Box::new(MemoryProvisioning { inner: self.inner.clone(), uid: account.uid, active: true }))
    }

    async fn delete_account(&self, id_token: &str) -> AppResult<()> {
        let Some(uid) = self.inner.tokens.write().remove(id_token) else {
            return Err(AppError::auth("invalid_id_token", "The credential token is invalid or expired"));
        };
        self.inner.accounts.write().retain(|_, a| a.uid != uid);
        self.inner.tokens.write().retain(|_, owner| *owner != uid);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> AppResult<()> {
        if !self.has_account(email) {
            return Err(AppError::not_found("email_not_found", "There is no account for this email"));
        }
        self.inner.resets.lock().push(email.to_string());
        Ok(())
    }
}

struct MemoryProvisioning {
    inner: Arc<Inner>,
    uid: String,
    active: bool,
}

#[async_trait]
impl ProvisioningSession for MemoryProvisioning {
    fn uid(&self) -> &str { &self.uid }

    fn is_active(&self) -> bool { self.active }

    async fn id_token(&mut self) -> AppResult<String> {
        if !self.active {
            return Err(AppError::auth("session_closed", "Provisioning session already signed out"));
        }
        Ok(self.inner.issue_token(&self.uid))
    }

    async fn sign_out(&mut self) -> AppResult<()> {
        self.active = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provisioning_does_not_touch_primary_session() {
        let idp = MemoryIdentity::new();
        idp.add_account("admin@isp.net", "admin-pass").unwrap();
        let admin = idp.sign_in("admin@isp.net", "admin-pass").await.unwrap();

        let mut session = idp.provision("new@isp.net", "password1").await.unwrap();
        let token = session.id_token().await.unwrap();
        session.sign_out().await.unwrap();
        assert!(!session.is_active());
        assert_eq!(idp.current().unwrap().uid, admin.uid);

        idp.delete_account(&token).await.unwrap();
        assert!(!idp.has_account("new@isp.net"));
        assert!(idp.delete_account(&token).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_and_bad_credentials() {
        let idp = MemoryIdentity::new();
        idp.add_account("a@isp.net", "pw-123456").unwrap();
        assert_eq!(idp.provision("A@isp.net", "x").await.err().unwrap().code_str(), "email_exists");
        assert!(idp.sign_in("a@isp.net", "wrong").await.is_err());
        assert!(idp.current().is_none());
    }
}
