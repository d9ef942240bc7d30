//! Unified error handling
//!
//! Layer errors (`GatewayError`, `DatabaseError`, `CheckoutError`) converge
//! here into one `AppError` with HTTP status mapping, stable error codes for
//! client handling, and user-safe messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::error::DatabaseError;
use crate::gateway::GatewayError;
use crate::services::checkout::CheckoutError;

/// Stable error codes for programmatic client handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "DUPLICATE_REFERENCE")]
    DuplicateReference,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,
    #[serde(rename = "GATEWAY_ERROR")]
    GatewayError,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimitError,
    #[serde(rename = "WEBHOOK_ERROR")]
    WebhookError,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Domain-specific business errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// No payment record exists for the reference
    PaymentNotFound { reference: String },
    /// A record already exists for the reference
    DuplicateReference { reference: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

/// External service errors (the payment gateway)
#[derive(Debug, Clone)]
pub enum ExternalError {
    Gateway { message: String, is_retryable: bool },
    RateLimit { retry_after: Option<u64> },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidField { field: String, reason: String },
    MissingField { field: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { .. } => 404,
                DomainError::DuplicateReference { .. } => 409,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => 500,
                InfrastructureError::Configuration { .. } => 500,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { .. } => 502,
                ExternalError::RateLimit { .. } => 429,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(DomainError::PaymentNotFound { .. }) => ErrorCode::PaymentNotFound,
            AppErrorKind::Domain(DomainError::DuplicateReference { .. }) => {
                ErrorCode::DuplicateReference
            }
            AppErrorKind::Infrastructure(InfrastructureError::Database { .. }) => {
                ErrorCode::DatabaseError
            }
            AppErrorKind::Infrastructure(InfrastructureError::Configuration { .. }) => {
                ErrorCode::ConfigurationError
            }
            AppErrorKind::External(ExternalError::Gateway { .. }) => ErrorCode::GatewayError,
            AppErrorKind::External(ExternalError::RateLimit { .. }) => ErrorCode::RateLimitError,
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// User-safe message; internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(DomainError::PaymentNotFound { reference }) => {
                format!("No payment found for reference {}", reference)
            }
            AppErrorKind::Domain(DomainError::DuplicateReference { .. }) => {
                "A payment already exists for this reference".to_string()
            }
            AppErrorKind::Infrastructure(_) => {
                "The service hit an internal problem. Please try again".to_string()
            }
            AppErrorKind::External(ExternalError::Gateway { .. }) => {
                "The payment gateway is temporarily unavailable. Please try again".to_string()
            }
            AppErrorKind::External(ExternalError::RateLimit { .. }) => {
                "Too many requests. Please retry shortly".to_string()
            }
            AppErrorKind::Validation(ValidationError::InvalidField { field, reason }) => {
                format!("Invalid {}: {}", field, reason)
            }
            AppErrorKind::Validation(ValidationError::MissingField { field }) => {
                format!("Missing required field: {}", field)
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AppErrorKind::Domain(err) => write!(f, "domain error: {:?}", err),
            AppErrorKind::Infrastructure(err) => write!(f, "infrastructure error: {:?}", err),
            AppErrorKind::External(err) => write!(f, "external error: {:?}", err),
            AppErrorKind::Validation(err) => write!(f, "validation error: {:?}", err),
        }
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: ErrorDetails {
                code: self.error_code(),
                message: self.user_message(),
                request_id: self.request_id.clone(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let kind = if err.is_duplicate() {
            AppErrorKind::Domain(DomainError::DuplicateReference {
                reference: "unknown".to_string(),
            })
        } else {
            AppErrorKind::Infrastructure(InfrastructureError::Database {
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            })
        };
        AppError::new(kind)
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let kind = match &err {
            GatewayError::Validation { message, field } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.clone().unwrap_or_else(|| "request".to_string()),
                    reason: message.clone(),
                })
            }
            GatewayError::RateLimit {
                retry_after_seconds,
                ..
            } => AppErrorKind::External(ExternalError::RateLimit {
                retry_after: *retry_after_seconds,
            }),
            _ => AppErrorKind::External(ExternalError::Gateway {
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            }),
        };
        AppError::new(kind)
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Validation(gateway) | CheckoutError::Initialization(gateway) => {
                gateway.into()
            }
            CheckoutError::NotFound { reference } => {
                AppError::new(AppErrorKind::Domain(DomainError::PaymentNotFound {
                    reference,
                }))
            }
            CheckoutError::Database(db) => db.into(),
        }
    }
}
