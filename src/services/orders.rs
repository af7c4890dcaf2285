use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::CheckoutConfig,
    entities::{
        order, order::OrderStatus, order::PaymentMethod, order::PaymentStatus, order_item,
        product_variant, Order, OrderItem, Product, ProductVariant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{cart::CartService, coupons::CouponService, inventory::InventoryService,
        payments::PaymentService},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl ShippingAddress {
    fn is_complete(&self) -> bool {
        !(self.line1.trim().is_empty()
            || self.city.trim().is_empty()
            || self.state.trim().is_empty()
            || self.postal_code.trim().is_empty()
            || self.country.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OrderItemInput {
    pub variant_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PlaceOrderInput {
    pub customer: CustomerInfo,
    pub shipping_address: ShippingAddress,
    #[schema(value_type = String, example = "cod")]
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderItemInput>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    /// Cart the checkout was built from; only used by the
    /// clear-after-checkout policy.
    #[serde(default)]
    pub cart_id: Option<Uuid>,
}

/// Result of a successful placement.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderPlacement {
    pub order_id: Uuid,
    pub order_number: String,
    pub total_amount: Decimal,
    #[schema(value_type = String)]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetails {
    #[schema(value_type = Object)]
    pub order: order::Model,
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LookupOrderInput {
    pub order_number: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Sanitized projection for number+contact lookup. Carries no gateway
/// identifiers and echoes no contact details.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderSummary {
    pub order_id: Uuid,
    pub order_number: String,
    #[schema(value_type = String)]
    pub status: OrderStatus,
    #[schema(value_type = String)]
    pub payment_method: PaymentMethod,
    #[schema(value_type = String)]
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub delivery_fee: Decimal,
    pub total_amount: Decimal,
    pub customer_name: String,
    pub coupon_code: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub delivered_at: Option<chrono::DateTime<Utc>>,
    pub items: Vec<OrderLineSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderLineSummary {
    pub product_name: String,
    pub size: String,
    pub color: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

struct PricedLine {
    variant: product_variant::Model,
    product_name: String,
    quantity: i32,
}

/// Order assembly and lookup.
///
/// Placement runs without an ambient transaction: each step either succeeds
/// or triggers explicit compensation (restore every stock decrement, delete
/// the order and its items) before the failure is surfaced. The stock and
/// coupon writes themselves are conditional updates, so concurrent checkouts
/// cannot oversell a variant or overrun a coupon's usage limit.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    inventory: Arc<InventoryService>,
    coupons: Arc<CouponService>,
    cart: Arc<CartService>,
    payments: Arc<PaymentService>,
    checkout: CheckoutConfig,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        inventory: Arc<InventoryService>,
        coupons: Arc<CouponService>,
        cart: Arc<CartService>,
        payments: Arc<PaymentService>,
        checkout: CheckoutConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory,
            coupons,
            cart,
            payments,
            checkout,
        }
    }

    /// Places an order for the given items.
    ///
    /// Validates everything it can before touching the store: input shape,
    /// live prices, a read-only stock pre-check for every line, and coupon
    /// eligibility. Only then does it create the order and claim stock; the
    /// conditional decrement is the authoritative reservation, and any
    /// failure past order creation rolls the placement back completely.
    #[instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn place_order(
        &self,
        caller: Option<Uuid>,
        input: PlaceOrderInput,
    ) -> Result<OrderPlacement, ServiceError> {
        validate_place_order_input(&input)?;

        let lines = self.price_lines(&input.items).await?;

        let subtotal: Decimal = lines
            .iter()
            .map(|line| line.variant.effective_price() * Decimal::from(line.quantity))
            .sum();
        if subtotal <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Order subtotal must be positive".to_string(),
            ));
        }

        let discount_amount = match &input.coupon_code {
            Some(code) => self.coupons.validate(code, subtotal).await?,
            None => Decimal::ZERO,
        };

        let delivery_fee = compute_delivery_fee(subtotal, &self.checkout);
        let total_amount = subtotal - discount_amount + delivery_fee;
        if total_amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Order total must be positive".to_string(),
            ));
        }

        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();
        let now = Utc::now();

        let order_row = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(caller),
            status: Set(OrderStatus::Pending),
            payment_method: Set(input.payment_method),
            payment_status: Set(PaymentStatus::Pending),
            subtotal: Set(subtotal),
            discount_amount: Set(discount_amount),
            delivery_fee: Set(delivery_fee),
            total_amount: Set(total_amount),
            customer_name: Set(input.customer.name.clone()),
            customer_email: Set(input.customer.email.clone()),
            customer_phone: Set(input.customer.phone.clone()),
            shipping_address: Set(serde_json::to_value(&input.shipping_address)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            coupon_code: Set(input.coupon_code.clone()),
            gateway_order_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            delivered_at: Set(None),
        };
        let order_row = order_row.insert(&*self.db).await?;

        let item_rows: Vec<order_item::ActiveModel> = lines
            .iter()
            .map(|line| {
                let unit_price = line.variant.effective_price();
                order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    product_id: Set(Some(line.variant.product_id)),
                    variant_id: Set(Some(line.variant.id)),
                    product_name: Set(line.product_name.clone()),
                    size: Set(line.variant.size.clone()),
                    color: Set(line.variant.color.clone()),
                    quantity: Set(line.quantity),
                    unit_price: Set(unit_price),
                    total_price: Set(unit_price * Decimal::from(line.quantity)),
                    created_at: Set(now),
                }
            })
            .collect();

        if let Err(e) = OrderItem::insert_many(item_rows).exec(&*self.db).await {
            error!(%order_id, error = %e, "Order item creation failed; deleting order");
            self.rollback_placement(order_id, &[], None).await;
            return Err(ServiceError::OrderCreation(format!(
                "failed to create order items: {}",
                e
            )));
        }

        // Claim stock line by line, remembering what to put back on failure.
        let mut reserved: Vec<(Uuid, i32)> = Vec::with_capacity(lines.len());
        for line in &lines {
            match self.inventory.try_reserve(line.variant.id, line.quantity).await {
                Ok(()) => reserved.push((line.variant.id, line.quantity)),
                Err(e) => {
                    warn!(%order_id, variant_id = %line.variant.id, "Stock reservation failed; rolling back placement");
                    self.rollback_placement(order_id, &reserved, None).await;
                    return Err(e);
                }
            }
        }

        if let Some(code) = &input.coupon_code {
            if let Err(e) = self.coupons.record_usage(code).await {
                warn!(%order_id, code = %code, "Coupon redemption failed; rolling back placement");
                self.rollback_placement(order_id, &reserved, None).await;
                return Err(e);
            }
        }

        if input.payment_method == PaymentMethod::Online {
            match self
                .payments
                .create_gateway_order(total_amount, &order_number)
                .await
            {
                Ok(Some(gateway_order_id)) => {
                    let mut update: order::ActiveModel = order_row.clone().into();
                    update.gateway_order_id = Set(Some(gateway_order_id));
                    update.updated_at = Set(Utc::now());
                    if let Err(e) = update.update(&*self.db).await {
                        error!(%order_id, error = %e, "Failed to attach gateway order; rolling back placement");
                        self.rollback_placement(order_id, &reserved, input.coupon_code.as_deref())
                            .await;
                        return Err(ServiceError::DatabaseError(e));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(%order_id, "Gateway order creation failed; rolling back placement");
                    self.rollback_placement(order_id, &reserved, input.coupon_code.as_deref())
                        .await;
                    return Err(e);
                }
            }
        }

        if self.checkout.clear_cart_after_checkout {
            if let Some(cart_id) = input.cart_id {
                if let Err(e) = self.cart.clear_by_id(cart_id).await {
                    // The order stands; an unemptied cart is not worth failing it.
                    warn!(%order_id, %cart_id, error = %e, "Post-checkout cart clear failed");
                }
            }
        }

        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;

        info!(%order_id, %order_number, %total_amount, "Order placed");
        Ok(OrderPlacement {
            order_id,
            order_number,
            total_amount,
            payment_method: input.payment_method,
        })
    }

    /// Fetches an order with its items, enforcing visibility: the owner sees
    /// their orders; guest orders (no owner) are visible to whoever holds
    /// the id.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        caller: Option<Uuid>,
    ) -> Result<OrderDetails, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if let Some(owner) = order.user_id {
            if caller != Some(owner) {
                return Err(ServiceError::AccessDenied(
                    "Order belongs to another customer".to_string(),
                ));
            }
        }

        let items = order.find_related(OrderItem).all(&*self.db).await?;
        Ok(OrderDetails { order, items })
    }

    /// Looks an order up by its human-facing number plus a matching contact
    /// field. A number that exists but whose contact does not match is
    /// indistinguishable from a missing order.
    #[instrument(skip(self, input), fields(order_number = %input.order_number))]
    pub async fn lookup_order(&self, input: LookupOrderInput) -> Result<OrderSummary, ServiceError> {
        if input.email.is_none() && input.phone.is_none() {
            return Err(ServiceError::ValidationError(
                "Provide an email or phone number to look up an order".to_string(),
            ));
        }

        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(input.order_number.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", input.order_number))
            })?;

        let email_matches = input
            .email
            .as_deref()
            .map(|email| email.eq_ignore_ascii_case(&order.customer_email))
            .unwrap_or(false);
        let phone_matches = input
            .phone
            .as_deref()
            .map(|phone| phone == order.customer_phone)
            .unwrap_or(false);

        if !email_matches && !phone_matches {
            return Err(ServiceError::NotFound(format!(
                "Order {} not found",
                input.order_number
            )));
        }

        let items = order.find_related(OrderItem).all(&*self.db).await?;
        Ok(summarize(order, items))
    }

    /// Best-effort compensation: put reserved stock back, undo a recorded
    /// coupon redemption, then delete the order's items and the order
    /// itself. Failures here are logged and swallowed — the caller is
    /// already propagating the original error.
    async fn rollback_placement(
        &self,
        order_id: Uuid,
        reserved: &[(Uuid, i32)],
        redeemed_coupon: Option<&str>,
    ) {
        if let Some(code) = redeemed_coupon {
            if let Err(e) = self.coupons.revert_usage(code).await {
                error!(%order_id, code, error = %e, "Rollback failed to revert coupon usage");
            }
        }
        for (variant_id, quantity) in reserved {
            if let Err(e) = self.inventory.release(*variant_id, *quantity).await {
                error!(%order_id, %variant_id, error = %e, "Rollback failed to release stock");
            }
        }
        if let Err(e) = OrderItem::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&*self.db)
            .await
        {
            error!(%order_id, error = %e, "Rollback failed to delete order items");
        }
        if let Err(e) = Order::delete_by_id(order_id).exec(&*self.db).await {
            error!(%order_id, error = %e, "Rollback failed to delete order");
        }
    }

    /// Loads and prices every requested line, failing the whole request on
    /// the first unknown variant or short stock. Read-only: the
    /// authoritative stock claim happens later, at reservation.
    async fn price_lines(
        &self,
        items: &[OrderItemInput],
    ) -> Result<Vec<PricedLine>, ServiceError> {
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let (variant, product) = ProductVariant::find_by_id(item.variant_id)
                .find_also_related(Product)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Variant {} does not exist",
                        item.variant_id
                    ))
                })?;

            let product_name = product
                .map(|p| p.name)
                .unwrap_or_else(|| variant.sku.clone());

            if variant.stock_quantity < item.quantity {
                return Err(ServiceError::InsufficientStock {
                    product_name,
                    available: variant.stock_quantity,
                    requested: item.quantity,
                });
            }

            lines.push(PricedLine {
                variant,
                product_name,
                quantity: item.quantity,
            });
        }
        Ok(lines)
    }
}

fn validate_place_order_input(input: &PlaceOrderInput) -> Result<(), ServiceError> {
    if input.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "Order must contain at least one item".to_string(),
        ));
    }
    for item in &input.items {
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for variant {} must be positive",
                item.variant_id
            )));
        }
    }
    let mut seen = std::collections::HashSet::new();
    for item in &input.items {
        if !seen.insert(item.variant_id) {
            return Err(ServiceError::ValidationError(format!(
                "Variant {} appears more than once",
                item.variant_id
            )));
        }
    }
    if input.customer.name.trim().is_empty()
        || input.customer.email.trim().is_empty()
        || input.customer.phone.trim().is_empty()
    {
        return Err(ServiceError::ValidationError(
            "Customer name, email, and phone are required".to_string(),
        ));
    }
    if !input.shipping_address.is_complete() {
        return Err(ServiceError::ValidationError(
            "Shipping address is incomplete".to_string(),
        ));
    }
    Ok(())
}

/// High-entropy human-facing order number. Uniqueness comes from the UUID,
/// not the clock.
fn generate_order_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", suffix[..12].to_uppercase())
}

fn compute_delivery_fee(subtotal: Decimal, checkout: &CheckoutConfig) -> Decimal {
    let threshold =
        Decimal::from_f64_retain(checkout.free_delivery_threshold).unwrap_or(Decimal::ZERO);
    if subtotal >= threshold {
        Decimal::ZERO
    } else {
        Decimal::from_f64_retain(checkout.delivery_fee).unwrap_or(Decimal::ZERO)
    }
}

fn summarize(order: order::Model, items: Vec<order_item::Model>) -> OrderSummary {
    OrderSummary {
        order_id: order.id,
        order_number: order.order_number,
        status: order.status,
        payment_method: order.payment_method,
        payment_status: order.payment_status,
        subtotal: order.subtotal,
        discount_amount: order.discount_amount,
        delivery_fee: order.delivery_fee,
        total_amount: order.total_amount,
        customer_name: order.customer_name,
        coupon_code: order.coupon_code,
        created_at: order.created_at,
        delivered_at: order.delivered_at,
        items: items
            .into_iter()
            .map(|item| OrderLineSummary {
                product_name: item.product_name,
                size: item.size,
                color: item.color,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
            })
            .collect(),
    }
}
