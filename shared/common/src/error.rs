use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment error: {0}")]
    Payment(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("{0}")]
    Rejected(Rejection),
}

/// Business-rule refusals. Each one carries a tag clients can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    SelfChat,
    Blocked,
    Forbidden,
    NotOwner,
    AccountBlocked,
    AccountUnverified,
    AdNotFound,
    AdNotValidated,
    OfferInactive,
    AlreadyBoosted,
    DuplicateTransaction,
    AmountMismatch,
    PaymentNotConfirmed,
    InvalidTransaction,
    OfferInUse,
}

impl Rejection {
    pub fn tag(&self) -> &'static str {
        match self {
            Rejection::SelfChat => "SELF_CHAT",
            Rejection::Blocked => "BLOCKED",
            Rejection::Forbidden => "FORBIDDEN",
            Rejection::NotOwner => "NOT_OWNER",
            Rejection::AccountBlocked => "ACCOUNT_BLOCKED",
            Rejection::AccountUnverified => "ACCOUNT_UNVERIFIED",
            Rejection::AdNotFound => "AD_NOT_FOUND",
            Rejection::AdNotValidated => "AD_NOT_VALIDATED",
            Rejection::OfferInactive => "OFFER_INACTIVE",
            Rejection::AlreadyBoosted => "ALREADY_BOOSTED",
            Rejection::DuplicateTransaction => "DUPLICATE_TRANSACTION",
            Rejection::AmountMismatch => "AMOUNT_MISMATCH",
            Rejection::PaymentNotConfirmed => "PAYMENT_NOT_CONFIRMED",
            Rejection::InvalidTransaction => "INVALID_TRANSACTION",
            Rejection::OfferInUse => "OFFER_IN_USE",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Rejection::SelfChat
            | Rejection::Blocked
            | Rejection::Forbidden
            | Rejection::NotOwner
            | Rejection::AccountBlocked
            | Rejection::AccountUnverified => 403,
            Rejection::AdNotFound => 404,
            Rejection::AdNotValidated
            | Rejection::OfferInactive
            | Rejection::AlreadyBoosted
            | Rejection::DuplicateTransaction
            | Rejection::OfferInUse => 409,
            Rejection::AmountMismatch | Rejection::PaymentNotConfirmed => 402,
            Rejection::InvalidTransaction => 400,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Rejection::SelfChat => "You cannot start a conversation about your own ad",
            Rejection::Blocked => "This conversation is blocked",
            Rejection::Forbidden => "You are not allowed to access this resource",
            Rejection::NotOwner => "Only the owner of the ad can perform this action",
            Rejection::AccountBlocked => "Your account is blocked",
            Rejection::AccountUnverified => "Your account is not verified",
            Rejection::AdNotFound => "Ad not found",
            Rejection::AdNotValidated => "The ad has not been validated yet",
            Rejection::OfferInactive => "This boost offer is not available",
            Rejection::AlreadyBoosted => "The ad already has an active boost",
            Rejection::DuplicateTransaction => "This transaction has already been used",
            Rejection::AmountMismatch => "The paid amount does not match the offer price",
            Rejection::PaymentNotConfirmed => "The payment was not confirmed by the gateway",
            Rejection::InvalidTransaction => "Unknown or invalid transaction",
            Rejection::OfferInUse => "The offer still has active purchases",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        AppError::Rejected(rejection)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "error")]
    pub error_code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

impl ApiError {
    pub fn new(error_code: String, message: String) -> Self {
        Self {
            error_code,
            message,
            details: None,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

// HTTP status code mapping
impl AppError {
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Authentication(_) => 401,
            AppError::Authorization(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::Validation(_) => 400,
            AppError::Conflict(_) => 409,
            AppError::Payment(_) => 402,
            AppError::ExternalService(_) => 502,
            AppError::Rejected(rejection) => rejection.status_code(),
            AppError::Database(_) | AppError::Internal(_) => 500,
        }
    }

    pub fn error_code(&self) -> &str {
        match self {
            AppError::Database(_) => "INTERNAL",
            AppError::Authentication(_) => "UNAUTHENTICATED",
            AppError::Authorization(_) => "FORBIDDEN",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Payment(_) => "PAYMENT_ERROR",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::Internal(_) => "INTERNAL",
            AppError::Rejected(rejection) => rejection.tag(),
        }
    }

    /// True when the error is the database reporting a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db_error)) => {
                db_error.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        let message = match self {
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        ApiError::new(self.error_code().to_string(), message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(e) => tracing::error!(error = %e, "database error"),
            AppError::Internal(msg) => tracing::error!(error = %msg, "internal error"),
            AppError::ExternalService(msg) => tracing::warn!(error = %msg, "external service error"),
            _ => tracing::debug!(error = %self, "request rejected"),
        }

        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        (status, Json(self.to_api_error())).into_response()
    }
}
