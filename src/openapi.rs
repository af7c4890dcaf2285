use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        description = "Customer-facing storefront backend: carts, checkout, order tracking, and payment confirmation"
    ),
    paths(
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_to_cart,
        crate::handlers::carts::update_cart_item,
        crate::handlers::carts::remove_cart_item,
        crate::handlers::carts::clear_cart,
        crate::handlers::carts::merge_carts,
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::lookup_order,
        crate::handlers::payments::confirm_payment,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::handlers::carts::AddItemRequest,
        crate::handlers::carts::UpdateQuantityRequest,
        crate::handlers::payments::PaymentConfirmationResponse,
        crate::services::cart::CartView,
        crate::services::cart::CartLine,
        crate::services::orders::PlaceOrderInput,
        crate::services::orders::OrderItemInput,
        crate::services::orders::CustomerInfo,
        crate::services::orders::ShippingAddress,
        crate::services::orders::OrderPlacement,
        crate::services::orders::OrderDetails,
        crate::services::orders::LookupOrderInput,
        crate::services::orders::OrderSummary,
        crate::services::orders::OrderLineSummary,
        crate::services::payments::ConfirmPaymentInput,
    )),
    tags(
        (name = "Carts", description = "Guest and customer shopping carts"),
        (name = "Orders", description = "Order placement, tracking, and lookup"),
        (name = "Payments", description = "Payment gateway callbacks")
    )
)]
pub struct ApiDoc;
