use std::sync::Arc;

use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    handlers::common::success_response,
    services::{ConfirmPaymentInput, PaymentConfirmation},
    AppState,
};

/// Creates the router for payment endpoints. The confirm endpoint carries no
/// bearer auth: the HMAC signature is the callback's authentication.
pub fn payments_routes() -> Router<Arc<AppState>> {
    Router::new().route("/confirm", post(confirm_payment))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentConfirmationResponse {
    #[schema(example = "confirmed")]
    pub status: &'static str,
    pub order_id: Uuid,
    pub order_number: String,
    #[schema(value_type = String)]
    pub payment_status: crate::entities::order::PaymentStatus,
}

/// Confirm a payment from the gateway's signed callback
#[utoipa::path(
    post,
    path = "/api/v1/payments/confirm",
    request_body = ConfirmPaymentInput,
    responses(
        (status = 200, description = "Payment confirmed (idempotent)", body = PaymentConfirmationResponse),
        (status = 401, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConfirmPaymentInput>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let confirmation = state.services.payments.confirm_payment(payload).await?;

    let status = match &confirmation {
        PaymentConfirmation::Confirmed(_) => "confirmed",
        PaymentConfirmation::AlreadyConfirmed(_) => "already_confirmed",
    };
    let order = confirmation.order();

    Ok(success_response(PaymentConfirmationResponse {
        status,
        order_id: order.id,
        order_number: order.order_number.clone(),
        payment_status: order.payment_status,
    }))
}
