use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        cart, cart::CartStatus, cart_item, product, Cart, CartItem, Product, ProductVariant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Identifies whose cart an operation targets. Guest carts are keyed by the
/// client's opaque session id, signed-in carts by the customer id; both
/// populations share the same service contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    Guest { session_id: String },
    Customer { customer_id: Uuid },
}

/// Shopping cart service.
///
/// Carts hold (variant, quantity) pairs with one entry per variant; adding a
/// variant that is already present sums the quantities. Carts are priced at
/// read time from each variant's current effective price, so a price change
/// between add and checkout changes the displayed subtotal.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Returns the owner's cart with live-priced items, creating an empty
    /// active cart on first touch.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let cart = self.find_or_create(owner).await?;
        self.view(cart).await
    }

    /// Adds `quantity` units of a variant, merging with any existing entry
    /// for the same variant. Identical for guest and customer carts.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let cart = self.find_or_create(owner).await?;

        ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::VariantId.eq(variant_id))
            .one(&*self.db)
            .await?;

        match existing {
            Some(item) => {
                let current = item.quantity;
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(current + quantity);
                item.updated_at = Set(Utc::now());
                item.update(&*self.db).await?;
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    variant_id: Set(variant_id),
                    quantity: Set(quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                };
                item.insert(&*self.db).await?;
            }
        }

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                variant_id,
            })
            .await;

        info!(cart_id = %cart.id, %variant_id, quantity, "Added item to cart");
        self.view(cart).await
    }

    /// Sets an item's quantity; zero or negative removes the item.
    #[instrument(skip(self))]
    pub async fn set_item_quantity(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let cart = self
            .find_active(owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No active cart".to_string()))?;

        let item = CartItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.cart_id != cart.id {
            return Err(ServiceError::NotFound(format!(
                "Cart item {} not found",
                item_id
            )));
        }

        if quantity <= 0 {
            CartItem::delete_by_id(item_id).exec(&*self.db).await?;
            self.event_sender
                .send_or_log(Event::CartItemRemoved {
                    cart_id: cart.id,
                    item_id,
                })
                .await;
        } else {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&*self.db).await?;
        }

        self.view(cart).await
    }

    /// Empties the cart. Explicit user action; order placement only clears
    /// the cart when the checkout policy says so.
    #[instrument(skip(self))]
    pub async fn clear(&self, owner: &CartOwner) -> Result<(), ServiceError> {
        let Some(cart) = self.find_active(owner).await? else {
            return Ok(());
        };
        self.clear_by_id(cart.id).await
    }

    /// Empties a cart addressed by id. Used by checkout's
    /// clear-after-placement policy.
    pub async fn clear_by_id(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&*self.db)
            .await?;

        self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;
        info!(%cart_id, "Cleared cart");
        Ok(())
    }

    /// Folds a guest session's cart into the customer's cart on sign-in:
    /// per-variant quantities are summed, then the guest cart is emptied and
    /// fenced with the `merged` status. Triggering the merge again for the
    /// same session finds no active guest cart and is a no-op, so a
    /// duplicated sign-in hook cannot double the quantities.
    #[instrument(skip(self))]
    pub async fn merge_guest_into_customer(
        &self,
        session_id: &str,
        customer_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let customer_owner = CartOwner::Customer { customer_id };

        let guest_cart = Cart::find()
            .filter(cart::Column::SessionId.eq(session_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .one(&*self.db)
            .await?;

        let Some(guest_cart) = guest_cart else {
            // Nothing to merge (or already merged): idempotent no-op.
            return self.get_cart(&customer_owner).await;
        };

        let customer_cart = self.find_or_create(&customer_owner).await?;
        let guest_items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(guest_cart.id))
            .all(&*self.db)
            .await?;

        for guest_item in &guest_items {
            let existing = CartItem::find()
                .filter(cart_item::Column::CartId.eq(customer_cart.id))
                .filter(cart_item::Column::VariantId.eq(guest_item.variant_id))
                .one(&*self.db)
                .await?;

            match existing {
                Some(item) => {
                    let merged_quantity = item.quantity + guest_item.quantity;
                    let mut item: cart_item::ActiveModel = item.into();
                    item.quantity = Set(merged_quantity);
                    item.updated_at = Set(Utc::now());
                    item.update(&*self.db).await?;
                }
                None => {
                    let item = cart_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        cart_id: Set(customer_cart.id),
                        variant_id: Set(guest_item.variant_id),
                        quantity: Set(guest_item.quantity),
                        created_at: Set(Utc::now()),
                        updated_at: Set(Utc::now()),
                    };
                    item.insert(&*self.db).await?;
                }
            }
        }

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(guest_cart.id))
            .exec(&*self.db)
            .await?;

        let mut fenced: cart::ActiveModel = guest_cart.clone().into();
        fenced.status = Set(CartStatus::Merged);
        fenced.updated_at = Set(Utc::now());
        fenced.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartsMerged {
                guest_cart_id: guest_cart.id,
                customer_cart_id: customer_cart.id,
            })
            .await;

        info!(
            guest_cart_id = %guest_cart.id,
            customer_cart_id = %customer_cart.id,
            merged_items = guest_items.len(),
            "Merged guest cart into customer cart"
        );

        self.view(customer_cart).await
    }

    async fn find_active(&self, owner: &CartOwner) -> Result<Option<cart::Model>, ServiceError> {
        let query = match owner {
            CartOwner::Guest { session_id } => {
                Cart::find().filter(cart::Column::SessionId.eq(session_id.clone()))
            }
            CartOwner::Customer { customer_id } => {
                Cart::find().filter(cart::Column::CustomerId.eq(*customer_id))
            }
        };

        Ok(query
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .one(&*self.db)
            .await?)
    }

    async fn find_or_create(&self, owner: &CartOwner) -> Result<cart::Model, ServiceError> {
        if let Some(cart) = self.find_active(owner).await? {
            return Ok(cart);
        }

        let cart_id = Uuid::new_v4();
        let (session_id, customer_id) = match owner {
            CartOwner::Guest { session_id } => (Some(session_id.clone()), None),
            CartOwner::Customer { customer_id } => (None, Some(*customer_id)),
        };

        let cart = cart::ActiveModel {
            id: Set(cart_id),
            session_id: Set(session_id),
            customer_id: Set(customer_id),
            status: Set(CartStatus::Active),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let cart = cart.insert(&*self.db).await?;

        self.event_sender.send_or_log(Event::CartCreated(cart_id)).await;
        Ok(cart)
    }

    /// Prices the cart from current variant data. Lines whose variant has
    /// disappeared from the catalog are omitted.
    async fn view(&self, cart: cart::Model) -> Result<CartView, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(ProductVariant)
            .all(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = rows
            .iter()
            .filter_map(|(_, variant)| variant.as_ref().map(|v| v.product_id))
            .collect();
        let product_names: HashMap<Uuid, String> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut lines = Vec::with_capacity(rows.len());
        for (item, variant) in rows {
            let Some(variant) = variant else { continue };
            let unit_price = variant.effective_price();
            lines.push(CartLine {
                item_id: item.id,
                variant_id: variant.id,
                product_id: variant.product_id,
                product_name: product_names
                    .get(&variant.product_id)
                    .cloned()
                    .unwrap_or_else(|| variant.sku.clone()),
                size: variant.size,
                color: variant.color,
                quantity: item.quantity,
                unit_price,
                line_total: unit_price * Decimal::from(item.quantity),
            });
        }

        let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();

        Ok(CartView {
            cart_id: cart.id,
            status: cart.status,
            items: lines,
            subtotal,
        })
    }
}

/// A cart line priced at read time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub item_id: Uuid,
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub size: String,
    pub color: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Cart with live-priced items and computed subtotal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartView {
    pub cart_id: Uuid,
    #[schema(value_type = String)]
    pub status: CartStatus,
    pub items: Vec<CartLine>,
    pub subtotal: Decimal,
}

impl CartView {
    pub fn find_line(&self, variant_id: Uuid) -> Option<&CartLine> {
        self.items.iter().find(|line| line.variant_id == variant_id)
    }
}
