//! Unified application error model and mapping helpers.
//! Every core operation (file gateway, document stores, repository, auth) returns
//! `AppResult<T>`; the HTTP layer maps the variant to a status code and a JSON body.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    RangeNotSatisfiable { code: String, message: String, size: u64 },
    TooManyRequests { code: String, message: String, retry_after: u64 },
    Storage { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::RangeNotSatisfiable { code, .. }
            | AppError::TooManyRequests { code, .. }
            | AppError::Storage { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::RangeNotSatisfiable { message, .. }
            | AppError::TooManyRequests { message, .. }
            | AppError::Storage { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn storage(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Storage { code: code.into(), message: msg.into() } }
    pub fn internal(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    pub fn range_not_satisfiable(size: u64) -> Self {
        AppError::RangeNotSatisfiable {
            code: "range_not_satisfiable".into(),
            message: format!("requested range not satisfiable for {} bytes", size),
            size,
        }
    }

    pub fn too_many_requests(retry_after: u64) -> Self {
        AppError::TooManyRequests {
            code: "too_many_attempts".into(),
            message: "too many failed attempts, try again later".into(),
            retry_after,
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::RangeNotSatisfiable { .. } => 416,
            AppError::TooManyRequests { .. } => 429,
            AppError::Storage { .. } => 500,
            AppError::Internal { .. } => 500,
        }
    }

    pub fn is_not_found(&self) -> bool { matches!(self, AppError::NotFound { .. }) }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Internal unless downcasted elsewhere
        match err.downcast::<AppError>() {
            Ok(app) => app,
            Err(other) => AppError::Internal { code: "internal_error".into(), message: other.to_string() },
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => AppError::not_found("not_found", err.to_string()),
            ErrorKind::AlreadyExists => AppError::conflict("already_exists", err.to_string()),
            ErrorKind::InvalidInput => AppError::user("invalid_argument", err.to_string()),
            _ => AppError::internal("io_error", err.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
