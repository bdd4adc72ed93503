//! Unified application error model.
//! Every flow, client and console command reports failures through `AppError`, which keeps a
//! machine-readable code next to the operator-facing message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validate::FieldErrors;

#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    #[error("{code}: {message}")]
    UserInput { code: String, message: String },
    #[error("{code}: {message}")]
    Validation { code: String, message: String, fields: FieldErrors },
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },
    #[error("{code}: {message}")]
    Auth { code: String, message: String },
    #[error("{code}: {message}")]
    Forbidden { code: String, message: String },
    #[error("{code}: {message}")]
    Transport { code: String, message: String },
    #[error("{code}: {message} (HTTP {status})")]
    Backend { code: String, message: String, status: u16 },
    #[error("{code}: {message}")]
    Io { code: String, message: String },
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Validation { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Transport { code, .. }
            | AppError::Backend { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Validation { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Transport { message, .. }
            | AppError::Backend { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn auth(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn transport(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Transport { code: code.into(), message: msg.into() } }
    pub fn io(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    pub fn backend(status: u16, msg: impl Into<String>) -> Self {
        AppError::Backend { code: "backend_status".into(), message: msg.into(), status }
    }

    pub fn validation(fields: FieldErrors) -> Self {
        AppError::Validation {
            code: "validation_failed".into(),
            message: "Please check the form for errors".into(),
            fields,
        }
    }

    /// Field-level errors when this is a validation failure.
    pub fn fields(&self) -> Option<&FieldErrors> {
        match self {
            AppError::Validation { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Map to an HTTP status code, for logs and the console's status line.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } | AppError::Validation { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Transport { .. } | AppError::Io { .. } => 503,
            AppError::Backend { status, .. } => *status,
            AppError::Internal { .. } => 500,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connect_failed"
        } else if err.is_decode() {
            "decode_failed"
        } else {
            "transport_error"
        };
        AppError::Transport { code: code.into(), message: err.to_string() }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal { code: "json_error".into(), message: err.to_string() }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io { code: "io_error".into(), message: err.to_string() }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::validation(FieldErrors::default()).http_status(), 400);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("forbidden", "no").http_status(), 403);
        assert_eq!(AppError::transport("connect_failed", "down").http_status(), 503);
        assert_eq!(AppError::backend(409, "dup").http_status(), 409);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn display_includes_code_and_message() {
        let e = AppError::not_found("role_record_missing", "Staff member not found");
        assert_eq!(e.to_string(), "role_record_missing: Staff member not found");
        assert_eq!(e.code_str(), "role_record_missing");
        assert_eq!(e.message(), "Staff member not found");

        let b = AppError::backend(500, "Unable to add staff");
        assert_eq!(b.to_string(), "backend_status: Unable to add staff (HTTP 500)");
    }

    #[test]
    fn validation_carries_fields() {
        let mut fields = FieldErrors::default();
        fields.insert("phone", "Phone number should be at least 10 digits");
        let e = AppError::validation(fields);
        assert_eq!(e.fields().and_then(|f| f.get("phone")), Some("Phone number should be at least 10 digits"));
        assert!(AppError::auth("a", "b").fields().is_none());
    }

    #[test]
    fn serde_tagging_is_snake_case() {
        let v = serde_json::to_value(AppError::forbidden("access_denied", "nope")).unwrap();
        assert_eq!(v["type"], "forbidden");
        assert_eq!(v["code"], "access_denied");
    }
}
