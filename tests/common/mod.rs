#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use storefront_api::{
    auth,
    config::AppConfig,
    db,
    entities::{coupon, coupon::DiscountType, product, product_variant},
    events::{self, EventSender},
    handlers::AppServices,
    services::orders::{CustomerInfo, OrderItemInput, PlaceOrderInput, ShippingAddress},
    AppState,
};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const TEST_CALLBACK_SECRET: &str = "callback_secret_for_tests";

/// Helper harness for spinning up application state backed by a throwaway
/// SQLite database.
pub struct TestApp {
    pub state: Arc<AppState>,
    db_file: std::path::PathBuf,
    _event_task: tokio::task::JoinHandle<()>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_file);
    }
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Construct a test application, letting the caller tweak the
    /// configuration before services are built.
    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let db_file = std::env::temp_dir().join(format!(
            "storefront_test_{}.db",
            Uuid::new_v4().simple()
        ));

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            TEST_JWT_SECRET,
            TEST_CALLBACK_SECRET,
        );
        customize(&mut cfg);

        let db = db::connect_with(&cfg.database_url, 1, 1)
            .await
            .expect("failed to connect to test database");
        db::ensure_schema(&db).await.expect("failed to create schema");
        let db = Arc::new(db);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let cfg = Arc::new(cfg);
        let services = AppServices::build(db.clone(), event_sender.clone(), &cfg)
            .expect("failed to build services");

        let state = Arc::new(AppState {
            db,
            config: cfg,
            event_sender,
            services,
        });

        Self {
            state,
            db_file,
            _event_task: event_task,
        }
    }

    pub fn router(&self) -> Router {
        storefront_api::app_router(self.state.clone())
    }

    /// Bearer token for an authenticated test principal.
    pub fn token_for(&self, user_id: Uuid) -> String {
        auth::issue_token(
            TEST_JWT_SECRET,
            user_id,
            Some("shopper@example.com".to_string()),
            Duration::from_secs(3600),
        )
        .expect("failed to issue test token")
    }

    /// Seeds a product with one variant and returns the variant id.
    pub async fn seed_variant(
        &self,
        name: &str,
        price: Decimal,
        discount_price: Option<Decimal>,
        stock_quantity: i32,
    ) -> Uuid {
        let product_id = Uuid::new_v4();
        let variant_id = Uuid::new_v4();

        product::ActiveModel {
            id: Set(product_id),
            name: Set(name.to_string()),
            description: Set(None),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed product");

        product_variant::ActiveModel {
            id: Set(variant_id),
            product_id: Set(product_id),
            sku: Set(format!("SKU-{}", variant_id.simple())),
            size: Set("M".to_string()),
            color: Set("black".to_string()),
            price: Set(price),
            discount_price: Set(discount_price),
            stock_quantity: Set(stock_quantity),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed variant");

        variant_id
    }

    /// Seeds a coupon and returns its code.
    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_type: DiscountType,
        discount_value: Decimal,
        min_order_amount: Decimal,
        max_discount_amount: Option<Decimal>,
        usage_limit: Option<i32>,
    ) -> String {
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_type: Set(discount_type),
            discount_value: Set(discount_value),
            min_order_amount: Set(min_order_amount),
            max_discount_amount: Set(max_discount_amount),
            usage_limit: Set(usage_limit),
            used_count: Set(0),
            is_active: Set(true),
            expires_at: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed coupon");

        code.to_string()
    }
}

/// A well-formed placement request for the given (variant, quantity) lines.
pub fn place_order_input(items: Vec<(Uuid, i32)>) -> PlaceOrderInput {
    PlaceOrderInput {
        customer: CustomerInfo {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "5550100".to_string(),
        },
        shipping_address: ShippingAddress {
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            postal_code: "62701".to_string(),
            country: "US".to_string(),
        },
        payment_method: storefront_api::entities::order::PaymentMethod::Cod,
        items: items
            .into_iter()
            .map(|(variant_id, quantity)| OrderItemInput {
                variant_id,
                quantity,
            })
            .collect(),
        coupon_code: None,
        cart_id: None,
    }
}
