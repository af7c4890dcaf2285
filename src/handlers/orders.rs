use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::{
    auth::OptionalUser,
    errors::ServiceError,
    handlers::common::{created_response, success_response},
    services::orders::{LookupOrderInput, PlaceOrderInput},
    AppState,
};

/// Creates the router for order endpoints.
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_order))
        .route("/lookup", post(lookup_order))
        .route("/:id", get(get_order))
}

/// Place an order
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = PlaceOrderInput,
    responses(
        (status = 201, description = "Order placed", body = crate::services::OrderPlacement),
        (status = 400, description = "Invalid input, insufficient stock, or rejected coupon", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    user: OptionalUser,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let caller = user.0.map(|u| u.user_id);

    let placement = state.services.orders.place_order(caller, payload).await?;

    Ok(created_response(placement))
}

/// Fetch an order by id, subject to the visibility rule
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items", body = crate::services::orders::OrderDetails),
        (status = 403, description = "Order belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    user: OptionalUser,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let caller = user.0.map(|u| u.user_id);

    let details = state.services.orders.get_order(id, caller).await?;

    Ok(success_response(details))
}

/// Look up an order by number and contact info
#[utoipa::path(
    post,
    path = "/api/v1/orders/lookup",
    request_body = LookupOrderInput,
    responses(
        (status = 200, description = "Sanitized order summary", body = crate::services::orders::OrderSummary),
        (status = 400, description = "No contact field supplied", body = crate::errors::ErrorResponse),
        (status = 404, description = "No matching order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn lookup_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LookupOrderInput>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let summary = state.services.orders.lookup_order(payload).await?;

    Ok(success_response(summary))
}
