pub mod carts;
pub mod common;
pub mod orders;
pub mod payments;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::AppConfig,
    errors::ServiceError,
    events::EventSender,
    services::{CartService, CouponService, InventoryService, OrderService, PaymentService},
};

/// Service instances shared by the request handlers.
#[derive(Clone)]
pub struct AppServices {
    pub inventory: Arc<InventoryService>,
    pub coupons: Arc<CouponService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn build(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Result<Self, ServiceError> {
        let inventory = Arc::new(InventoryService::new(db.clone(), event_sender.clone()));
        let coupons = Arc::new(CouponService::new(db.clone(), event_sender.clone()));
        let cart = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            event_sender.clone(),
            &config.payment,
        )?);
        let orders = Arc::new(OrderService::new(
            db,
            event_sender,
            inventory.clone(),
            coupons.clone(),
            cart.clone(),
            payments.clone(),
            config.checkout.clone(),
        ));

        Ok(Self {
            inventory,
            coupons,
            cart,
            orders,
            payments,
        })
    }
}
