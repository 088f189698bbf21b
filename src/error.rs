//! Application error type and its HTTP mapping.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

use crate::checkout::gateway::GatewayError;
use crate::checkout::metadata::MetadataError;
use crate::domain::aggregates::{ArtistError, CartError, CommunityError, OrderError, ProductError};
use crate::domain::value_objects::{MoneyError, ScoreError, SectionError};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    LimitExceeded(String),

    #[error("Payment provider error: {0}")]
    Payment(String),

    #[error("Invalid webhook signature: {0}")]
    Signature(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The message without the variant's prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::NotFound(m) | Self::BadRequest(m) | Self::Validation(m) | Self::Forbidden(m) | Self::Unauthorized(m)
            | Self::Duplicate(m) | Self::LimitExceeded(m) | Self::Payment(m) | Self::Signature(m) | Self::Upstream(m)
            | Self::Storage(m) | Self::Internal(m) => m,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Validation(_) | Self::Duplicate(_) | Self::Signature(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::LimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Payment(_) | Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(json!({ "message": self.to_string(), "status": status.as_u16() }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict(what) => Self::Duplicate(what),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self { Self::Payment(e.to_string()) }
}

impl From<MetadataError> for AppError {
    fn from(e: MetadataError) -> Self { Self::BadRequest(e.to_string()) }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

impl From<ProductError> for AppError {
    fn from(e: ProductError) -> Self {
        match e {
            ProductError::ColorNotFound(_) | ProductError::SizeNotFound(_) => Self::NotFound(e.to_string()),
            _ => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::ReturnAlreadyRequested => Self::Duplicate(e.to_string()),
            OrderError::ReturnWindowClosed => Self::Forbidden(e.to_string()),
            _ => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<CartError> for AppError {
    fn from(e: CartError) -> Self {
        match e { CartError::ItemNotFound => Self::NotFound(e.to_string()), CartError::InvalidQuantity => Self::BadRequest(e.to_string()) }
    }
}

impl From<CommunityError> for AppError {
    fn from(e: CommunityError) -> Self { Self::BadRequest(e.to_string()) }
}

impl From<ArtistError> for AppError {
    fn from(e: ArtistError) -> Self {
        match e {
            ArtistError::NotVerified => Self::Forbidden(e.to_string()),
            ArtistError::NotOwner => Self::NotFound(e.to_string()),
            ArtistError::PastDate | ArtistError::AlreadyReviewed => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<MoneyError> for AppError {
    fn from(e: MoneyError) -> Self { Self::Internal(e.to_string()) }
}

impl From<ScoreError> for AppError {
    fn from(e: ScoreError) -> Self { Self::Validation(e.to_string()) }
}

impl From<SectionError> for AppError {
    fn from(e: SectionError) -> Self { Self::BadRequest(e.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Duplicate("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::LimitExceeded("x".into()).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(AppError::from(OrderError::ReturnWindowClosed).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::from(ProductError::ColorNotFound("Red".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(StoreError::Conflict("email".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(ArtistError::NotOwner).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(ArtistError::NotVerified).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Internal("API key not configured".into()).detail(), "API key not configured");
    }
}
