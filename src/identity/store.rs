use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::principal::{Principal, Role};
use super::provider::IdentityProvider;
use crate::error::{AppError, AppResult};
use crate::model::RoleRecord;

/// Role documents keyed by identity account identifier.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get(&self, uid: &str) -> AppResult<Option<RoleRecord>>;

    /// Query by email. Identifiers on the REST side do not match document keys, so staff
    /// records are always located this way.
    async fn find_by_email(&self, email: &str) -> AppResult<Option<(String, RoleRecord)>>;

    /// Replace the document at `uid`.
    async fn put(&self, uid: &str, record: &RoleRecord) -> AppResult<()>;

    /// Deleting a missing document succeeds.
    async fn delete(&self, uid: &str) -> AppResult<()>;
}

/// Role of `principal`, or `None` when it has no record or the record carries no tag.
pub async fn resolve_role(store: &dyn RoleStore, principal: &Principal) -> AppResult<Option<Role>> {
    Ok(store.get(&principal.uid).await?.and_then(|r| r.role()))
}

#[derive(Debug, Default)]
pub struct MemoryRoleStore {
    docs: RwLock<BTreeMap<String, RoleRecord>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_record(self, uid: &str, record: RoleRecord) -> Self {
        self.docs.write().insert(uid.to_string(), record);
        self
    }

    pub fn snapshot(&self, uid: &str) -> Option<RoleRecord> { self.docs.read().get(uid).cloned() }

    pub fn len(&self) -> usize { self.docs.read().len() }

    pub fn is_empty(&self) -> bool { self.docs.read().is_empty() }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn get(&self, uid: &str) -> AppResult<Option<RoleRecord>> { Ok(self.snapshot(uid)) }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<(String, RoleRecord)>> {
        let docs = self.docs.read();
        Ok(docs.iter().find(|(_, r)| r.email == email).map(|(k, r)| (k.clone(), r.clone())))
    }

    async fn put(&self, uid: &str, record: &RoleRecord) -> AppResult<()> {
        self.docs.write().insert(uid.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, uid: &str) -> AppResult<()> {
        self.docs.write().remove(uid);
        Ok(())
    }
}

/// Role store that retries a refused call once after refreshing the signed-in principal's
/// token. Bearer tokens expire well before a console session does.
pub struct RefreshingRoleStore {
    inner: Arc<dyn RoleStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl RefreshingRoleStore {
    pub fn new(inner: Arc<dyn RoleStore>, identity: Arc<dyn IdentityProvider>) -> Self { Self { inner, identity } }

    /// `Ok` when the token was refreshed and the call is worth repeating; otherwise `err` back.
    async fn refresh_after(&self, err: AppError, what: &str) -> AppResult<()> {
        if !matches!(err, AppError::Auth { .. } | AppError::Forbidden { .. }) || self.identity.current().is_none() {
            return Err(err);
        }
        debug!(target: "ispdesk::roles", "{} refused code={}; refreshing token", what, err.code_str());
        match self.identity.refresh().await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(target: "ispdesk::roles", "token refresh failed: {}", e);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl RoleStore for RefreshingRoleStore {
    async fn get(&self, uid: &str) -> AppResult<Option<RoleRecord>> {
        match self.inner.get(uid).await {
            Err(e) => {
                self.refresh_after(e, "read").await?;
                self.inner.get(uid).await
            }
            done => done,
        }
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<(String, RoleRecord)>> {
        match self.inner.find_by_email(email).await {
            Err(e) => {
                self.refresh_after(e, "query").await?;
                self.inner.find_by_email(email).await
            }
            done => done,
        }
    }

    async fn put(&self, uid: &str, record: &RoleRecord) -> AppResult<()> {
        match self.inner.put(uid, record).await {
            Err(e) => {
                self.refresh_after(e, "write").await?;
                self.inner.put(uid, record).await
            }
            done => done,
        }
    }

    async fn delete(&self, uid: &str) -> AppResult<()> {
        match self.inner.delete(uid).await {
            Err(e) => {
                self.refresh_after(e, "delete").await?;
                self.inner.delete(uid).await
            }
            done => done,
        }
    }
}
