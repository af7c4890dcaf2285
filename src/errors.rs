use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

/// Error envelope returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "insufficient_stock",
    "message": "Insufficient stock for Classic Tee: 1 available, 2 requested",
    "details": {"product_name": "Classic Tee", "available": 1, "requested": 2},
    "timestamp": "2025-11-02T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// Stable machine-readable error kind
    #[schema(example = "insufficient_stock")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Structured details, when the error carries them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Reason a coupon was rejected during validation or redemption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    ExpiredOrInactive,
    BelowMinimum { min_order_amount: Decimal },
    UsageLimitReached,
}

impl std::fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpiredOrInactive => write!(f, "coupon is expired, inactive, or unknown"),
            Self::BelowMinimum { min_order_amount } => {
                write!(
                    f,
                    "order amount is below the coupon minimum of {}",
                    min_order_amount
                )
            }
            Self::UsageLimitReached => write!(f, "coupon usage limit has been reached"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock for {product_name}: {available} available, {requested} requested")]
    InsufficientStock {
        product_name: String,
        available: i32,
        requested: i32,
    },

    #[error("Coupon rejected: {0}")]
    CouponRejected(CouponRejection),

    #[error("Payment callback signature verification failed")]
    InvalidSignature,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Order creation failed: {0}")]
    OrderCreation(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Stable machine-readable kind, used as the `error` field of responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::CouponRejected(_) => "coupon_rejected",
            Self::InvalidSignature => "invalid_signature",
            Self::Unauthorized(_) => "unauthorized",
            Self::AccessDenied(_) => "access_denied",
            Self::OrderCreation(_) => "order_creation_failed",
            Self::ExternalService(_) => "external_service_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) | Self::InsufficientStock { .. } | Self::CouponRejected(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidSignature | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ExternalService(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_) | Self::OrderCreation(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// messages so store-level details never leak to clients.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Structured payload for errors that carry one.
    fn response_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientStock {
                product_name,
                available,
                requested,
            } => Some(json!({
                "product_name": product_name,
                "available": available,
                "requested": requested,
            })),
            Self::CouponRejected(rejection) => serde_json::to_value(rejection).ok(),
            _ => None,
        }
    }

    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: self.kind().to_string(),
            message: self.response_message(),
            details: self.response_details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientStock {
                product_name: "Tee".into(),
                available: 0,
                requested: 1
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidSignature.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::AccessDenied("not yours".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::NotFound("order".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ExternalService("gateway timeout".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn internal_errors_are_not_leaked() {
        let err = ServiceError::DatabaseError(DbErr::Custom("secret dsn".into()));
        assert_eq!(err.response_message(), "Database error");

        let err = ServiceError::InternalError("stack trace".into());
        assert_eq!(err.response_message(), "Internal server error");
    }

    #[test]
    fn insufficient_stock_carries_counts() {
        let err = ServiceError::InsufficientStock {
            product_name: "Classic Tee".into(),
            available: 1,
            requested: 2,
        };
        let details = err.response_details().expect("details expected");
        assert_eq!(details["available"], 1);
        assert_eq!(details["requested"], 2);
        assert_eq!(details["product_name"], "Classic Tee");
    }

    #[test]
    fn coupon_rejection_serializes_with_reason_tag() {
        let err = ServiceError::CouponRejected(CouponRejection::BelowMinimum {
            min_order_amount: dec!(50.00),
        });
        let details = err.response_details().expect("details expected");
        assert_eq!(details["reason"], "below_minimum");
    }
}
