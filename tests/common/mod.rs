//! Shared fixtures for the flow integration tests: a scripted REST backend, wrappers that
//! make one identity or store operation fail, and a context wired from in-memory parts.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use ispdesk::backend::{ApiResponse, Backend};
use ispdesk::context::AppContext;
use ispdesk::error::{AppError, AppResult};
use ispdesk::identity::memory::MemoryIdentity;
use ispdesk::identity::{AuthStream, IdentityProvider, MemoryRoleStore, Principal, ProvisioningSession, RoleStore};
use ispdesk::model::{
    Credentials, Customer, CustomerForm, CustomerId, CustomerPayload, RoleRecord, StaffForm, StaffId, StaffMember,
    StaffPayload,
};
use ispdesk::notify::RecordingNotifier;

/// Backend whose statuses are scripted per operation. Every call is counted; payloads are kept.
#[derive(Default)]
pub struct ScriptedBackend {
    pub customers: Mutex<Vec<Customer>>,
    pub staff: Mutex<Vec<StaffMember>>,
    statuses: Mutex<HashMap<&'static str, u16>>,
    calls: Mutex<Vec<&'static str>>,
    payloads: Mutex<Vec<(&'static str, Value)>>,
}

fn default_status(op: &str) -> u16 {
    match op {
        "create_customer" | "add_staff" => 201,
        "delete_customer" | "delete_staff" => 204,
        _ => 200,
    }
}

impl ScriptedBackend {
    pub fn new() -> Self { Self::default() }

    pub fn with_customers(self, customers: Vec<Customer>) -> Self {
        *self.customers.lock() = customers;
        self
    }

    pub fn with_staff(self, staff: Vec<StaffMember>) -> Self {
        *self.staff.lock() = staff;
        self
    }

    /// Make `op` answer with `status` from now on.
    pub fn set_status(&self, op: &'static str, status: u16) { self.statuses.lock().insert(op, status); }

    pub fn calls(&self) -> Vec<&'static str> { self.calls.lock().clone() }

    pub fn calls_to(&self, op: &str) -> usize { self.calls.lock().iter().filter(|c| **c == op).count() }

    pub fn last_payload(&self, op: &str) -> Option<Value> {
        self.payloads.lock().iter().rev().find(|(o, _)| *o == op).map(|(_, v)| v.clone())
    }

    fn hit(&self, op: &'static str, payload: Option<Value>) -> u16 {
        self.calls.lock().push(op);
        if let Some(p) = payload {
            self.payloads.lock().push((op, p));
        }
        self.statuses.lock().get(op).copied().unwrap_or_else(|| default_status(op))
    }

    fn reply<T>(status: u16, data: Option<T>) -> AppResult<ApiResponse<T>> {
        let message = if (200..300).contains(&status) { "ok" } else { "scripted failure" };
        Ok(ApiResponse::new(status, if (200..300).contains(&status) { data } else { None }, message))
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn login(&self, credentials: &Credentials) -> AppResult<ApiResponse<Value>> {
        let status = self.hit("login", Some(json!({ "username": credentials.username })));
        Self::reply(status, None)
    }

    async fn logout(&self) -> AppResult<ApiResponse<Value>> {
        let status = self.hit("logout", None);
        Self::reply(status, None)
    }

    async fn get_customers(&self) -> AppResult<ApiResponse<Vec<Customer>>> {
        let status = self.hit("get_customers", None);
        Self::reply(status, Some(self.customers.lock().clone()))
    }

    async fn get_customer(&self, id: CustomerId) -> AppResult<ApiResponse<Customer>> {
        let status = self.hit("get_customer", None);
        let found = self.customers.lock().iter().find(|c| c.db_id == Some(id)).cloned();
        match found {
            Some(c) => Self::reply(status, Some(c)),
            None => Self::reply(404, None),
        }
    }

    async fn create_customer(&self, payload: &CustomerPayload) -> AppResult<ApiResponse<Value>> {
        let status = self.hit("create_customer", Some(serde_json::to_value(payload)?));
        if status == 201 {
            let mut customers = self.customers.lock();
            let id = customers.iter().filter_map(|c| c.db_id).max().unwrap_or(0) + 1;
            customers.push(Customer {
                db_id: Some(id),
                name: payload.name.clone(),
                phone: payload.phone.clone(),
                email: payload.email.clone(),
                balance: Some(payload.balance),
                router_ip_address: Some(payload.router_ip_address.clone()),
                ..Customer::default()
            });
        }
        Self::reply(status, None)
    }

    async fn update_customer(&self, _id: CustomerId, payload: &CustomerPayload) -> AppResult<ApiResponse<Value>> {
        let status = self.hit("update_customer", Some(serde_json::to_value(payload)?));
        Self::reply(status, None)
    }

    async fn delete_customer(&self, id: CustomerId) -> AppResult<ApiResponse<Value>> {
        let status = self.hit("delete_customer", None);
        if status == 204 {
            self.customers.lock().retain(|c| c.db_id != Some(id));
        }
        Self::reply(status, None)
    }

    async fn get_staff(&self) -> AppResult<ApiResponse<Vec<StaffMember>>> {
        let status = self.hit("get_staff", None);
        Self::reply(status, Some(self.staff.lock().clone()))
    }

    async fn add_staff(&self, payload: &StaffPayload) -> AppResult<ApiResponse<Value>> {
        let status = self.hit("add_staff", Some(serde_json::to_value(payload)?));
        Self::reply(status, None)
    }

    async fn update_staff(&self, _id: StaffId, payload: &StaffPayload) -> AppResult<ApiResponse<Value>> {
        let status = self.hit("update_staff", Some(serde_json::to_value(payload)?));
        Self::reply(status, None)
    }

    async fn delete_staff(&self, id: StaffId) -> AppResult<ApiResponse<Value>> {
        let status = self.hit("delete_staff", None);
        if status == 204 {
            self.staff.lock().retain(|m| m.id != id);
        }
        Self::reply(status, None)
    }
}

/// Identity provider whose account deletion always fails.
pub struct NoDeleteIdentity(pub MemoryIdentity);

#[async_trait]
impl IdentityProvider for NoDeleteIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Principal> { self.0.sign_in(email, password).await }
    async fn sign_out(&self) -> AppResult<()> { self.0.sign_out().await }
    async fn refresh(&self) -> AppResult<Principal> { self.0.refresh().await }
    fn current(&self) -> Option<Principal> { self.0.current() }
    fn subscribe(&self) -> AuthStream { self.0.subscribe() }
    async fn provision(&self, email: &str, password: &str) -> AppResult<Box<dyn ProvisioningSession>> {
        self.0.provision(email, password).await
    }
    async fn delete_account(&self, _id_token: &str) -> AppResult<()> {
        Err(AppError::auth("token_expired", "The user's credential is no longer valid. The user must sign in again."))
    }
    async fn send_password_reset(&self, email: &str) -> AppResult<()> { self.0.send_password_reset(email).await }
}

/// Role store that fails the operations named in `failing`, delegating the rest.
pub struct FlakyRoleStore {
    pub inner: Arc<MemoryRoleStore>,
    pub failing: Vec<&'static str>,
}

impl FlakyRoleStore {
    fn check(&self, op: &str) -> AppResult<()> {
        if self.failing.iter().any(|f| *f == op) {
            Err(AppError::forbidden("role_store_denied", "Missing or insufficient permissions."))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RoleStore for FlakyRoleStore {
    async fn get(&self, uid: &str) -> AppResult<Option<RoleRecord>> {
        self.check("get")?;
        self.inner.get(uid).await
    }
    async fn find_by_email(&self, email: &str) -> AppResult<Option<(String, RoleRecord)>> {
        self.check("find_by_email")?;
        self.inner.find_by_email(email).await
    }
    async fn put(&self, uid: &str, record: &RoleRecord) -> AppResult<()> {
        self.check("put")?;
        self.inner.put(uid, record).await
    }
    async fn delete(&self, uid: &str) -> AppResult<()> {
        self.check("delete")?;
        self.inner.delete(uid).await
    }
}

/// Everything a flow test needs to drive a context and inspect its collaborators.
pub struct Harness {
    pub ctx: AppContext,
    pub backend: Arc<ScriptedBackend>,
    pub identity: MemoryIdentity,
    pub roles: Arc<MemoryRoleStore>,
    pub notices: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(backend: ScriptedBackend) -> Self {
        let identity = MemoryIdentity::new();
        Self::assemble(backend, identity.clone(), Arc::new(identity), Arc::new(MemoryRoleStore::new()), None)
    }

    /// Context whose identity provider cannot delete accounts.
    pub fn without_account_deletion(backend: ScriptedBackend) -> Self {
        let identity = MemoryIdentity::new();
        Self::assemble(
            backend,
            identity.clone(),
            Arc::new(NoDeleteIdentity(identity)),
            Arc::new(MemoryRoleStore::new()),
            None,
        )
    }

    /// Context whose role store fails the named operations.
    pub fn with_flaky_store(backend: ScriptedBackend, failing: Vec<&'static str>) -> Self {
        let identity = MemoryIdentity::new();
        let roles = Arc::new(MemoryRoleStore::new());
        let flaky: Arc<dyn RoleStore> = Arc::new(FlakyRoleStore { inner: roles.clone(), failing });
        Self::assemble(backend, identity.clone(), Arc::new(identity), roles, Some(flaky))
    }

    fn assemble(
        backend: ScriptedBackend,
        identity: MemoryIdentity,
        provider: Arc<dyn IdentityProvider>,
        roles: Arc<MemoryRoleStore>,
        store_override: Option<Arc<dyn RoleStore>>,
    ) -> Self {
        let backend = Arc::new(backend);
        let notices = Arc::new(RecordingNotifier::new());
        let store: Arc<dyn RoleStore> = store_override.unwrap_or_else(|| roles.clone());
        let ctx = AppContext::new(backend.clone(), provider, store, notices.clone());
        Self { ctx, backend, identity, roles, notices }
    }

    /// Create an account with a role document holding a live token; returns the identifier.
    pub async fn seed_account(&self, email: &str, password: &str, role: Option<&str>) -> String {
        let uid = self.identity.add_account(email, password).unwrap();
        let token = mint_token(&self.identity, email, password).await;
        let record = RoleRecord {
            username: email.split('@').next().unwrap_or_default().to_string(),
            email: email.to_string(),
            role: role.map(str::to_string),
            id_token: Some(token),
            ..RoleRecord::default()
        };
        self.roles.put(&uid, &record).await.unwrap();
        uid
    }

    pub fn titles(&self) -> Vec<String> { self.notices.notices().into_iter().map(|n| n.title).collect() }
}

/// Sign in and straight back out, keeping the issued token.
pub async fn mint_token(identity: &MemoryIdentity, email: &str, password: &str) -> String {
    let principal = identity.sign_in(email, password).await.unwrap();
    identity.sign_out().await.unwrap();
    principal.id_token
}

pub fn customer(id: CustomerId, name: &str) -> Customer {
    Customer {
        db_id: Some(id),
        name: name.to_string(),
        phone: "0712345678".into(),
        email: format!("{}@example.co.ke", name.to_lowercase().replace(' ', ".")),
        balance: Some(0.0),
        router_ip_address: Some("192.168.88.1".into()),
        ..Customer::default()
    }
}

pub fn valid_customer_form() -> CustomerForm {
    CustomerForm {
        name: "Acme Networks".into(),
        phone: "0712345678".into(),
        email: "ops@acme.co.ke".into(),
        balance: "0".into(),
        router_ip_address: "10.0.0.1".into(),
        bandwidth: "20".into(),
        subscription_amount: "2500".into(),
        start_date: "2024-01-01".into(),
        last_payment_date: String::new(),
    }
}

pub fn member(id: StaffId, username: &str, email: &str) -> StaffMember {
    StaffMember { id, username: username.into(), email: email.into(), is_staff: true, ..StaffMember::default() }
}

pub fn valid_staff_form(email: &str) -> StaffForm {
    StaffForm {
        username: "jkamau".into(),
        email: email.into(),
        first_name: "Joseph".into(),
        last_name: "Kamau".into(),
        password: "s3cret-pass".into(),
        confirm_password: "s3cret-pass".into(),
        ..StaffForm::default()
    }
}
