use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{product_variant, Product, ProductVariant},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Service for reading and reserving per-variant stock.
///
/// Reservation is a single conditional decrement at the store
/// (`stock_quantity = stock_quantity - n WHERE stock_quantity >= n`), so two
/// concurrent checkouts racing for the last unit cannot both succeed.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Point read of the current stock level. Uncached: callers must see the
    /// latest committed decrement.
    #[instrument(skip(self))]
    pub async fn get_stock(&self, variant_id: Uuid) -> Result<i32, ServiceError> {
        let variant = ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

        Ok(variant.stock_quantity)
    }

    /// Claims `quantity` units of the variant's stock for an order.
    ///
    /// Zero affected rows means the conditional decrement found less stock
    /// than requested (or no such variant); the failure carries the live
    /// available count so the client can adjust.
    #[instrument(skip(self))]
    pub async fn try_reserve(&self, variant_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Reservation quantity must be positive".to_string(),
            ));
        }

        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::StockQuantity,
                Expr::col(product_variant::Column::StockQuantity).sub(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(variant_id))
            .filter(product_variant::Column::StockQuantity.gte(quantity))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            let (variant, product) = ProductVariant::find_by_id(variant_id)
                .find_also_related(Product)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Variant {} not found", variant_id))
                })?;

            return Err(ServiceError::InsufficientStock {
                product_name: product.map(|p| p.name).unwrap_or_else(|| variant.sku.clone()),
                available: variant.stock_quantity,
                requested: quantity,
            });
        }

        self.event_sender
            .send_or_log(Event::StockReserved {
                variant_id,
                quantity,
            })
            .await;

        info!(%variant_id, quantity, "Reserved stock");
        Ok(())
    }

    /// Returns previously reserved units to stock. Only order-placement
    /// compensation calls this; the storefront itself never restocks.
    #[instrument(skip(self))]
    pub async fn release(&self, variant_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Release quantity must be positive".to_string(),
            ));
        }

        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::StockQuantity,
                Expr::col(product_variant::Column::StockQuantity).add(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(variant_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Variant {} not found",
                variant_id
            )));
        }

        self.event_sender
            .send_or_log(Event::StockReleased {
                variant_id,
                quantity,
            })
            .await;

        info!(%variant_id, quantity, "Released stock");
        Ok(())
    }
}
