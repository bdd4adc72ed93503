//! REST backend: system of record for customers and staff.
//!
//! Every call resolves to an [`ApiResponse`] carrying the HTTP status, the decoded body and a
//! message; flows branch on the exact status. `Err` is reserved for requests that never
//! produced a response (connection refused, timeout, undecodable body).

pub mod http;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::model::{Credentials, Customer, CustomerId, CustomerPayload, StaffId, StaffMember, StaffPayload};

pub const OK: u16 = 200;
pub const CREATED: u16 = 201;
pub const NO_CONTENT: u16 = 204;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub data: Option<T>,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn new(status: u16, data: Option<T>, message: impl Into<String>) -> Self {
        Self { status, data, message: message.into() }
    }

    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

    /// Accept exactly `expected`. Any other status fails with the server's message, or with
    /// `fallback` when the status was a 2xx the caller does not treat as success.
    pub fn expect_status(self, expected: u16, fallback: &str) -> AppResult<Self> {
        if self.status == expected {
            return Ok(self);
        }
        let message = if self.is_success() || self.message.is_empty() { fallback.to_string() } else { self.message };
        Err(AppError::backend(self.status, message))
    }

    pub fn into_data(self) -> AppResult<T> {
        self.data.ok_or_else(|| AppError::internal("empty_body", "The server returned no data"))
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> AppResult<ApiResponse<Value>>;
    async fn logout(&self) -> AppResult<ApiResponse<Value>>;

    async fn get_customers(&self) -> AppResult<ApiResponse<Vec<Customer>>>;
    async fn get_customer(&self, id: CustomerId) -> AppResult<ApiResponse<Customer>>;
    async fn create_customer(&self, payload: &CustomerPayload) -> AppResult<ApiResponse<Value>>;
    async fn update_customer(&self, id: CustomerId, payload: &CustomerPayload) -> AppResult<ApiResponse<Value>>;
    async fn delete_customer(&self, id: CustomerId) -> AppResult<ApiResponse<Value>>;

    async fn get_staff(&self) -> AppResult<ApiResponse<Vec<StaffMember>>>;
    async fn add_staff(&self, payload: &StaffPayload) -> AppResult<ApiResponse<Value>>;
    async fn update_staff(&self, id: StaffId, payload: &StaffPayload) -> AppResult<ApiResponse<Value>>;
    async fn delete_staff(&self, id: StaffId) -> AppResult<ApiResponse<Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_status_only() {
        let ok = ApiResponse::<Value>::new(201, None, "Staff added successfully");
        assert!(ok.clone().expect_status(CREATED, "Unable to add staff").is_ok());

        let err = ok.expect_status(OK, "Unable to update staff").unwrap_err();
        assert_eq!(err.message(), "Unable to update staff");
        assert_eq!(err.http_status(), 201);

        let server = ApiResponse::<Value>::new(409, None, "username taken");
        let err = server.expect_status(CREATED, "Unable to add staff").unwrap_err();
        assert_eq!(err.message(), "username taken");
    }

    #[test]
    fn missing_body_is_an_error() {
        let r = ApiResponse::<Vec<Customer>>::new(200, None, "Customers fetched successfully");
        assert_eq!(r.into_data().unwrap_err().code_str(), "empty_body");
    }
}
