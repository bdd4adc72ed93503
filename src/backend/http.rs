use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::{ApiResponse, Backend};
use crate::error::{AppError, AppResult};
use crate::model::{Credentials, Customer, CustomerId, CustomerPayload, StaffId, StaffMember, StaffPayload};

/// Success and failure texts used when the server does not supply a message.
struct Messages {
    ok: &'static str,
    failed: &'static str,
}

const LOGIN: Messages = Messages { ok: "Login successful", failed: "An error occurred during login" };
const LOGOUT: Messages = Messages { ok: "Logout successful", failed: "An error occurred during logout" };
const GET_CUSTOMERS: Messages =
    Messages { ok: "Customers fetched successfully", failed: "An error occurred while fetching customers" };
const GET_CUSTOMER: Messages =
    Messages { ok: "Customer fetched successfully", failed: "An error occurred while fetching the customer" };
const CREATE_CUSTOMER: Messages =
    Messages { ok: "Customer created successfully", failed: "An error occurred while creating the customer" };
const UPDATE_CUSTOMER: Messages =
    Messages { ok: "Customer updated successfully", failed: "An error occurred while updating the customer" };
const DELETE_CUSTOMER: Messages =
    Messages { ok: "Customer deleted successfully", failed: "An error occurred while deleting the customer" };
const GET_STAFF: Messages = Messages { ok: "Staff fetched successfully", failed: "An error occurred while fetching staff" };
const ADD_STAFF: Messages = Messages {
    ok: "Staff added successfully",
    failed: "An error occurred while adding staff. Ensure username doesn't exist",
};
const UPDATE_STAFF: Messages = Messages { ok: "Staff updated successfully", failed: "An error occurred while updating staff" };
const DELETE_STAFF: Messages = Messages { ok: "Staff deleted successfully", failed: "An error occurred while deleting staff" };

/// REST backend over HTTP. The client keeps a cookie store so the login session carries over
/// to later calls.
#[derive(Clone)]
pub struct HttpBackend {
    base: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(base: &str) -> AppResult<Self> {
        let client = Client::builder().cookie_store(true).build()?;
        Self::with_client(base, client)
    }

    pub fn with_client(base: &str, client: Client) -> AppResult<Self> {
        let parsed = Url::parse(base).map_err(|e| AppError::user("invalid_api_url", format!("invalid API URL {base}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::user("invalid_api_url", format!("unsupported scheme in API URL: {}", parsed.scheme())));
        }
        Ok(Self { base: base.trim_end_matches('/').to_string(), client })
    }

    pub fn base(&self) -> &str { &self.base }

    fn url(&self, path: &str) -> String { format!("{}{}", self.base, path) }

    async fn exchange(&self, method: Method, path: &str, body: Option<Value>) -> AppResult<(u16, Vec<u8>)> {
        let mut req = self.client.request(method.clone(), self.url(path));
        if let Some(b) = &body {
            req = req.json(b);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?.to_vec();
        debug!(target: "ispdesk::backend", "{} {} -> {} ({} bytes)", method, path, status, bytes.len());
        Ok((status, bytes))
    }

    fn failure(status: u16, bytes: &[u8], msgs: &Messages) -> ApiResponse<Value> {
        let message = serde_json::from_slice::<Value>(bytes)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| msgs.failed.to_string());
        ApiResponse::new(status, None, message)
    }

    /// Fetch a typed body. A 2xx body that does not decode is an error.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        msgs: &Messages,
    ) -> AppResult<ApiResponse<T>> {
        let (status, bytes) = self.exchange(method, path, body).await?;
        if (200..300).contains(&status) {
            let data = if bytes.is_empty() { None } else { Some(serde_json::from_slice::<T>(&bytes)?) };
            return Ok(ApiResponse::new(status, data, msgs.ok));
        }
        let failed = Self::failure(status, &bytes, msgs);
        Ok(ApiResponse::new(status, None, failed.message))
    }

    /// Mutations: the status decides the outcome, so a 2xx body that is not JSON is kept as
    /// `data: None` rather than failing a write the server already applied.
    async fn ack(&self, method: Method, path: &str, body: Option<Value>, msgs: &Messages) -> AppResult<ApiResponse<Value>> {
        let (status, bytes) = self.exchange(method, path, body).await?;
        if !(200..300).contains(&status) {
            return Ok(Self::failure(status, &bytes, msgs));
        }
        let data = match serde_json::from_slice::<Value>(&bytes) {
            Ok(v) => Some(v),
            Err(e) => {
                if !bytes.is_empty() {
                    debug!(target: "ispdesk::backend", "{} body is not JSON: {}", path, e);
                }
                None
            }
        };
        Ok(ApiResponse::new(status, data, msgs.ok))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn login(&self, credentials: &Credentials) -> AppResult<ApiResponse<Value>> {
        self.ack(Method::POST, "/api", Some(serde_json::to_value(credentials)?), &LOGIN).await
    }

    async fn logout(&self) -> AppResult<ApiResponse<Value>> { self.ack(Method::POST, "/api/logout", None, &LOGOUT).await }

    async fn get_customers(&self) -> AppResult<ApiResponse<Vec<Customer>>> {
        self.call(Method::GET, "/api/get_customers", None, &GET_CUSTOMERS).await
    }

    async fn get_customer(&self, id: CustomerId) -> AppResult<ApiResponse<Customer>> {
        self.call(Method::GET, &format!("/api/view_customer/{id}"), None, &GET_CUSTOMER).await
    }

    async fn create_customer(&self, payload: &CustomerPayload) -> AppResult<ApiResponse<Value>> {
        self.ack(Method::POST, "/api/create", Some(serde_json::to_value(payload)?), &CREATE_CUSTOMER).await
    }

    async fn update_customer(&self, id: CustomerId, payload: &CustomerPayload) -> AppResult<ApiResponse<Value>> {
        self.ack(Method::PUT, &format!("/api/update/{id}"), Some(serde_json::to_value(payload)?), &UPDATE_CUSTOMER).await
    }

    async fn delete_customer(&self, id: CustomerId) -> AppResult<ApiResponse<Value>> {
        self.ack(Method::DELETE, &format!("/api/delete/{id}"), None, &DELETE_CUSTOMER).await
    }

    async fn get_staff(&self) -> AppResult<ApiResponse<Vec<StaffMember>>> {
        self.call(Method::GET, "/staff", None, &GET_STAFF).await
    }

    async fn add_staff(&self, payload: &StaffPayload) -> AppResult<ApiResponse<Value>> {
        self.ack(Method::POST, "/staff_signup", Some(serde_json::to_value(payload)?), &ADD_STAFF).await
    }

    async fn update_staff(&self, id: StaffId, payload: &StaffPayload) -> AppResult<ApiResponse<Value>> {
        self.ack(Method::PUT, &format!("/update_staff/{id}"), Some(serde_json::to_value(payload)?), &UPDATE_STAFF).await
    }

    async fn delete_staff(&self, id: StaffId) -> AppResult<ApiResponse<Value>> {
        self.ack(Method::DELETE, &format!("/api/delete_staff/{id}"), None, &DELETE_STAFF).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_is_validated_and_trimmed() {
        let b = HttpBackend::new("https://api.isp.net/").unwrap();
        assert_eq!(b.url("/staff"), "https://api.isp.net/staff");
        assert_eq!(HttpBackend::new("not a url").err().unwrap().code_str(), "invalid_api_url");
        assert!(HttpBackend::new("ftp://api.isp.net").is_err());
    }
}
