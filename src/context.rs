//! Explicitly constructed session context handed to every screen.

use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::backend::http::HttpBackend;
use crate::backend::Backend;
use crate::config::Config;
use crate::error::AppResult;
use crate::flows::customers::CustomerDirectory;
use crate::flows::staff::StaffDirectory;
use crate::identity::documents::DocumentRoleStore;
use crate::identity::toolkit::IdentityToolkit;
use crate::identity::{Capabilities, IdentityProvider, RefreshingRoleStore, RoleStore, SessionResolver};
use crate::notify::{Notice, Notifier};

#[derive(Clone)]
pub struct AppContext {
    pub backend: Arc<dyn Backend>,
    pub identity: Arc<dyn IdentityProvider>,
    pub roles: Arc<dyn RoleStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppContext {
    pub fn new(
        backend: Arc<dyn Backend>,
        identity: Arc<dyn IdentityProvider>,
        roles: Arc<dyn RoleStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { backend, identity, roles, notifier }
    }

    /// Wire the HTTP backend, the REST identity provider and the document role store.
    pub fn from_config(cfg: &Config, notifier: Arc<dyn Notifier>) -> AppResult<Self> {
        let api_key = cfg.require_api_key()?;
        let documents_base = cfg.documents_base()?;
        let backend = HttpBackend::new(&cfg.api_url)?;
        let identity = IdentityToolkit::new(&cfg.identity_url, &cfg.token_url, api_key)?;
        let roles = DocumentRoleStore::new(Client::builder().build()?, &documents_base, &cfg.role_collection, identity.subscribe());
        info!(target: "ispdesk::context", "context ready backend={} roles={}/{}", backend.base(), documents_base, cfg.role_collection);
        let identity: Arc<dyn IdentityProvider> = Arc::new(identity);
        let roles = RefreshingRoleStore::new(Arc::new(roles), identity.clone());
        Ok(Self::new(Arc::new(backend), identity, Arc::new(roles), notifier))
    }

    /// Start a resolver following this context's auth stream.
    pub fn resolve_session(&self) -> SessionResolver { SessionResolver::spawn(self.identity.subscribe(), self.roles.clone()) }

    pub fn notify(&self, notice: Notice) { self.notifier.notify(notice) }

    pub fn customers(&self, caps: Capabilities) -> CustomerDirectory { CustomerDirectory::new(self.clone(), caps) }

    pub fn staff(&self, caps: Capabilities) -> StaffDirectory { StaffDirectory::new(self.clone(), caps) }
}
