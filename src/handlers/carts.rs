use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::HeaderMap,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{AuthenticatedUser, OptionalUser, SESSION_HEADER},
    errors::ServiceError,
    handlers::common::{no_content_response, success_response, validate_input},
    services::CartOwner,
    AppState,
};

/// Creates the router for cart endpoints.
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/current", get(get_cart))
        .route("/items", post(add_to_cart))
        .route("/items/:item_id", put(update_cart_item))
        .route("/items/:item_id", delete(remove_cart_item))
        .route("/clear", post(clear_cart))
        .route("/merge", post(merge_carts))
}

/// Resolves whose cart a request addresses: the bearer principal when one is
/// present, else the guest session header.
fn cart_owner(user: &OptionalUser, headers: &HeaderMap) -> Result<CartOwner, ServiceError> {
    if let Some(user) = &user.0 {
        return Ok(CartOwner::Customer {
            customer_id: user.user_id,
        });
    }
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            ServiceError::Unauthorized(format!(
                "provide a bearer token or {} header",
                SESSION_HEADER
            ))
        })?;
    Ok(CartOwner::Guest {
        session_id: session_id.to_string(),
    })
}

/// Get the caller's cart, creating it on first touch
#[utoipa::path(
    get,
    path = "/api/v1/carts/current",
    responses(
        (status = 200, description = "Cart with live-priced items", body = crate::services::CartView),
        (status = 401, description = "No identity supplied", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: OptionalUser,
    headers: HeaderMap,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let owner = cart_owner(&user, &headers)?;
    let cart = state.services.cart.get_cart(&owner).await?;
    Ok(success_response(cart))
}

/// Add an item to the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/carts/items",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = crate::services::CartView),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown variant", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    user: OptionalUser,
    headers: HeaderMap,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let owner = cart_owner(&user, &headers)?;

    let cart = state
        .services
        .cart
        .add_item(&owner, payload.variant_id, payload.quantity)
        .await?;

    Ok(success_response(cart))
}

/// Set a cart item's quantity (0 removes it)
#[utoipa::path(
    put,
    path = "/api/v1/carts/items/{item_id}",
    request_body = UpdateQuantityRequest,
    params(("item_id" = Uuid, Path, description = "Cart item id")),
    responses(
        (status = 200, description = "Updated cart", body = crate::services::CartView),
        (status = 404, description = "Unknown cart item", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    user: OptionalUser,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let owner = cart_owner(&user, &headers)?;

    let cart = state
        .services
        .cart
        .set_item_quantity(&owner, item_id, payload.quantity)
        .await?;

    Ok(success_response(cart))
}

/// Remove an item from the caller's cart
#[utoipa::path(
    delete,
    path = "/api/v1/carts/items/{item_id}",
    params(("item_id" = Uuid, Path, description = "Cart item id")),
    responses(
        (status = 204, description = "Item removed"),
        (status = 404, description = "Unknown cart item", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn remove_cart_item(
    State(state): State<Arc<AppState>>,
    user: OptionalUser,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let owner = cart_owner(&user, &headers)?;

    state
        .services
        .cart
        .set_item_quantity(&owner, item_id, 0)
        .await?;

    Ok(no_content_response())
}

/// Clear all items from the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/carts/clear",
    responses((status = 200, description = "Cart cleared")),
    tag = "Carts"
)]
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    user: OptionalUser,
    headers: HeaderMap,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let owner = cart_owner(&user, &headers)?;
    state.services.cart.clear(&owner).await?;

    Ok(success_response(serde_json::json!({
        "message": "Cart cleared successfully"
    })))
}

/// Merge the guest session's cart into the signed-in customer's cart.
/// Invoked by the storefront right after sign-in; safe to invoke twice.
#[utoipa::path(
    post,
    path = "/api/v1/carts/merge",
    responses(
        (status = 200, description = "Customer cart after the merge", body = crate::services::CartView),
        (status = 401, description = "Missing credentials or session", body = crate::errors::ErrorResponse)
    ),
    tag = "Carts"
)]
pub async fn merge_carts(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            ServiceError::Unauthorized(format!("{} header required for merge", SESSION_HEADER))
        })?;

    let cart = state
        .services
        .cart
        .merge_guest_into_customer(session_id, user.user_id)
        .await?;

    Ok(success_response(cart))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddItemRequest {
    pub variant_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 0))]
    pub quantity: i32,
}
