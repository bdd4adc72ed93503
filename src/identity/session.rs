//! Session resolution: follows the auth stream and resolves each principal's role.
//!
//! One task per resolver. Every auth event supersedes the previous one; a role lookup still in
//! flight when a newer event arrives is dropped unfinished, so an older lookup can never
//! overwrite a newer state.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::principal::{Principal, Role};
use super::provider::AuthStream;
use super::store::{resolve_role, RoleStore};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub principal: Option<Principal>,
    pub role: Option<Role>,
    pub loading: bool,
    pub error: Option<AppError>,
}

impl Default for SessionState {
    /// Nothing observed yet.
    fn default() -> Self { Self { principal: None, role: None, loading: true, error: None } }
}

impl SessionState {
    pub fn signed_out() -> Self { Self { loading: false, ..Self::default() } }

    pub fn resolving(principal: Principal) -> Self { Self { principal: Some(principal), ..Self::default() } }

    pub fn resolved(principal: Principal, role: Option<Role>) -> Self {
        Self { principal: Some(principal), role, loading: false, error: None }
    }

    pub fn failed(principal: Principal, error: AppError) -> Self {
        Self { principal: Some(principal), role: None, loading: false, error: Some(error) }
    }

    pub fn uid(&self) -> Option<&str> { self.principal.as_ref().map(|p| p.uid.as_str()) }
}

/// Publishes resolver output until closed. The flag is checked under the same lock the
/// send happens under, so once `close` returns nothing more gets through.
struct Publisher {
    tx: watch::Sender<SessionState>,
    closed: Mutex<bool>,
}

impl Publisher {
    fn publish(&self, state: SessionState) -> bool {
        let closed = self.closed.lock();
        if *closed {
            return false;
        }
        self.tx.send_replace(state);
        true
    }

    fn close(&self) { *self.closed.lock() = true; }
}

pub struct SessionResolver {
    state: watch::Receiver<SessionState>,
    publisher: Arc<Publisher>,
    task: Option<JoinHandle<()>>,
}

impl SessionResolver {
    /// Start observing `events`. Must be called inside a tokio runtime.
    pub fn spawn(events: AuthStream, roles: Arc<dyn RoleStore>) -> Self {
        let (tx, state) = watch::channel(SessionState::default());
        let publisher = Arc::new(Publisher { tx, closed: Mutex::new(false) });
        let task = tokio::spawn(run(events, roles, publisher.clone()));
        Self { state, publisher, task: Some(task) }
    }

    pub fn current(&self) -> SessionState { self.state.borrow().clone() }

    /// A receiver that sees every state the resolver publishes (latest value only).
    pub fn watch(&self) -> watch::Receiver<SessionState> { self.state.clone() }

    /// Wait until the most recent event has finished resolving.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.state.clone();
        let settled = match rx.wait_for(|s| !s.loading).await {
            Ok(s) => s.clone(),
            Err(_) => self.current(),
        };
        settled
    }

    /// Wait until the resolver has settled on the principal `uid` (or on signed out for `None`).
    /// Used right after a sign-in or sign-out, before the resolver has seen the event.
    pub async fn settled_for(&self, uid: Option<&str>) -> SessionState {
        let mut rx = self.state.clone();
        let settled = match rx.wait_for(|s| !s.loading && s.uid() == uid).await {
            Ok(s) => s.clone(),
            Err(_) => self.current(),
        };
        settled
    }

    pub fn is_active(&self) -> bool { self.task.is_some() }

    /// Stop following the auth stream. No state is published after this returns.
    pub fn unsubscribe(&mut self) {
        self.publisher.close();
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(target: "ispdesk::session", "resolver unsubscribed");
        }
    }
}

impl Drop for SessionResolver {
    fn drop(&mut self) { self.unsubscribe(); }
}

async fn run(mut events: AuthStream, roles: Arc<dyn RoleStore>, out: Arc<Publisher>) {
    let mut current = events.borrow_and_update().clone();
    loop {
        if let Some(principal) = current.take() {
            debug!(target: "ispdesk::session", "resolving role uid={}", principal.uid);
            out.publish(SessionState::resolving(principal.clone()));
            tokio::select! {
                biased;
                Ok(()) = events.changed() => {
                    debug!(target: "ispdesk::session", "lookup superseded uid={}", principal.uid);
                    current = events.borrow_and_update().clone();
                    continue;
                }
                result = resolve_role(roles.as_ref(), &principal) => {
                    let state = match result {
                        Ok(role) => {
                            debug!(target: "ispdesk::session", "resolved uid={} role={:?}", principal.uid, role);
                            SessionState::resolved(principal, role)
                        }
                        Err(e) => {
                            warn!(target: "ispdesk::session", "role lookup failed: {}", e);
                            SessionState::failed(principal, e)
                        }
                    };
                    out.publish(state);
                }
            }
        } else {
            out.publish(SessionState::signed_out());
        }
        if events.changed().await.is_err() {
            debug!(target: "ispdesk::session", "auth stream closed");
            return;
        }
        current = events.borrow_and_update().clone();
    }
}
