mod common;

use assert_matches::assert_matches;
use common::{place_order_input, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use storefront_api::{
    entities::{coupon, coupon::DiscountType, order, Coupon, Order, OrderItem},
    errors::{CouponRejection, ServiceError},
};

async fn coupon_by_code(app: &TestApp, code: &str) -> coupon::Model {
    Coupon::find()
        .filter(coupon::Column::Code.eq(code))
        .one(&*app.state.db)
        .await
        .expect("coupon query")
        .expect("coupon exists")
}

#[tokio::test]
async fn placing_an_order_snapshots_items_and_decrements_stock() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Classic Tee", dec!(20.00), Some(dec!(18.00)), 10).await;

    let placement = orders
        .place_order(None, place_order_input(vec![(variant, 3)]))
        .await
        .expect("placement should succeed");

    assert!(placement.order_number.starts_with("ORD-"));
    // 3 x 18.00 = 54.00, over the free-delivery threshold.
    assert_eq!(placement.total_amount, dec!(54.00));

    let stock = app
        .state
        .services
        .inventory
        .get_stock(variant)
        .await
        .expect("stock read");
    assert_eq!(stock, 7);

    let order = Order::find_by_id(placement.order_id)
        .one(&*app.state.db)
        .await
        .expect("query")
        .expect("order exists");
    assert_eq!(order.status, order::OrderStatus::Pending);
    assert_eq!(order.payment_status, order::PaymentStatus::Pending);
    assert_eq!(order.subtotal, dec!(54.00));
    assert_eq!(order.delivery_fee, dec!(0));

    let items = OrderItem::find().all(&*app.state.db).await.expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_name, "Classic Tee");
    assert_eq!(items[0].unit_price, dec!(18.00));
    assert_eq!(items[0].total_price, dec!(54.00));
}

#[tokio::test]
async fn delivery_fee_applies_below_the_threshold() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Socks", dec!(5.00), None, 10).await;

    let placement = orders
        .place_order(None, place_order_input(vec![(variant, 2)]))
        .await
        .expect("placement should succeed");

    // 2 x 5.00 = 10.00 subtotal + 10.00 flat delivery fee.
    assert_eq!(placement.total_amount, dec!(20.00));
}

#[tokio::test]
async fn empty_item_list_is_rejected_before_any_mutation() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;

    let result = orders.place_order(None, place_order_input(vec![])).await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let order_count = Order::find().all(&*app.state.db).await.expect("query").len();
    assert_eq!(order_count, 0);
}

#[tokio::test]
async fn zero_priced_subtotal_is_rejected_before_any_mutation() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Freebie", dec!(0.00), None, 10).await;

    let result = orders
        .place_order(None, place_order_input(vec![(variant, 1)]))
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let stock = app
        .state
        .services
        .inventory
        .get_stock(variant)
        .await
        .expect("stock read");
    assert_eq!(stock, 10);
    assert!(Order::find().all(&*app.state.db).await.expect("query").is_empty());
}

#[tokio::test]
async fn short_stock_fails_with_live_counts_and_no_mutation() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let plenty = app.seed_variant("Classic Tee", dec!(20.00), None, 10).await;
    let scarce = app.seed_variant("Limited Hoodie", dec!(60.00), None, 1).await;

    let result = orders
        .place_order(None, place_order_input(vec![(plenty, 2), (scarce, 2)]))
        .await;

    match result {
        Err(ServiceError::InsufficientStock {
            product_name,
            available,
            requested,
        }) => {
            assert_eq!(product_name, "Limited Hoodie");
            assert_eq!(available, 1);
            assert_eq!(requested, 2);
        }
        other => panic!("expected InsufficientStock, got {:?}", other.map(|p| p.order_number)),
    }

    // The pre-check failed before anything was written.
    let inventory = &app.state.services.inventory;
    assert_eq!(inventory.get_stock(plenty).await.expect("stock"), 10);
    assert_eq!(inventory.get_stock(scarce).await.expect("stock"), 1);
    assert!(Order::find().all(&*app.state.db).await.expect("query").is_empty());
    assert!(OrderItem::find().all(&*app.state.db).await.expect("query").is_empty());
}

#[tokio::test]
async fn concurrent_checkouts_cannot_oversell_the_last_unit() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Last One", dec!(80.00), None, 1).await;

    let (first, second) = tokio::join!(
        orders.place_order(None, place_order_input(vec![(variant, 1)])),
        orders.place_order(None, place_order_input(vec![(variant, 1)])),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one checkout may win the last unit");

    for result in [first, second] {
        if let Err(e) = result {
            assert_matches!(e, ServiceError::InsufficientStock { requested: 1, .. });
        }
    }

    let stock = app
        .state
        .services
        .inventory
        .get_stock(variant)
        .await
        .expect("stock read");
    assert_eq!(stock, 0);

    // The losing placement left nothing behind.
    let order_rows = Order::find().all(&*app.state.db).await.expect("query");
    let item_rows = OrderItem::find().all(&*app.state.db).await.expect("query");
    assert_eq!(order_rows.len(), 1);
    assert_eq!(item_rows.len(), 1);
    let total_ordered: i32 = item_rows.iter().map(|item| item.quantity).sum();
    assert_eq!(total_ordered, 1);
}

#[tokio::test]
async fn coupon_discount_is_applied_and_usage_recorded() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Classic Tee", dec!(30.00), None, 10).await;
    let code = app
        .seed_coupon(
            "SAVE10",
            DiscountType::Percentage,
            dec!(10),
            dec!(50.00),
            Some(dec!(20.00)),
            Some(5),
        )
        .await;

    let mut input = place_order_input(vec![(variant, 2)]);
    input.coupon_code = Some(code.clone());

    let placement = orders
        .place_order(None, input)
        .await
        .expect("placement should succeed");

    // 60.00 subtotal - 6.00 discount, free delivery over the threshold.
    assert_eq!(placement.total_amount, dec!(54.00));

    let coupon = coupon_by_code(&app, &code).await;
    assert_eq!(coupon.used_count, 1);
}

#[tokio::test]
async fn order_below_coupon_minimum_is_rejected() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Socks", dec!(5.00), None, 10).await;
    let code = app
        .seed_coupon(
            "SAVE10",
            DiscountType::Percentage,
            dec!(10),
            dec!(50.00),
            None,
            None,
        )
        .await;

    let mut input = place_order_input(vec![(variant, 2)]);
    input.coupon_code = Some(code);

    let result = orders.place_order(None, input).await;
    assert_matches!(
        result,
        Err(ServiceError::CouponRejected(CouponRejection::BelowMinimum { .. }))
    );
    assert_eq!(
        app.state
            .services
            .inventory
            .get_stock(variant)
            .await
            .expect("stock"),
        10
    );
}

#[tokio::test]
async fn concurrent_redemptions_cannot_exceed_the_usage_limit() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Classic Tee", dec!(30.00), None, 100).await;
    let code = app
        .seed_coupon(
            "ONCE",
            DiscountType::Fixed,
            dec!(5.00),
            dec!(0.00),
            None,
            Some(1),
        )
        .await;

    let mut input_a = place_order_input(vec![(variant, 2)]);
    input_a.coupon_code = Some(code.clone());
    let mut input_b = place_order_input(vec![(variant, 2)]);
    input_b.coupon_code = Some(code.clone());

    let (first, second) = tokio::join!(
        orders.place_order(None, input_a),
        orders.place_order(None, input_b),
    );

    let coupon = coupon_by_code(&app, &code).await;
    assert_eq!(coupon.used_count, 1, "usage may never exceed the limit");

    // Whichever placement lost was rejected and fully compensated: stock
    // reflects only the surviving orders.
    let surviving: Vec<_> = [first, second].into_iter().filter_map(|r| r.ok()).collect();
    let discounted = Order::find()
        .all(&*app.state.db)
        .await
        .expect("query")
        .into_iter()
        .filter(|o| o.coupon_code.is_some())
        .count();
    assert!(discounted <= 1);
    assert_eq!(discounted, surviving.len());

    let expected_stock = 100 - 2 * surviving.len() as i32;
    assert_eq!(
        app.state
            .services
            .inventory
            .get_stock(variant)
            .await
            .expect("stock"),
        expected_stock
    );
}

#[tokio::test]
async fn gateway_failure_rolls_back_stock_coupon_and_order() {
    let app = TestApp::with_config(|cfg| {
        // Unroutable gateway: every outbound call fails fast.
        cfg.payment.gateway_base_url = Some("http://127.0.0.1:1".to_string());
        cfg.payment.gateway_key_id = Some("key".to_string());
        cfg.payment.gateway_key_secret = Some("secret".to_string());
        cfg.payment.request_timeout_secs = 2;
    })
    .await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Classic Tee", dec!(30.00), None, 10).await;
    let code = app
        .seed_coupon(
            "SAVE5",
            DiscountType::Fixed,
            dec!(5.00),
            dec!(0.00),
            None,
            Some(10),
        )
        .await;

    let mut input = place_order_input(vec![(variant, 2)]);
    input.payment_method = storefront_api::entities::order::PaymentMethod::Online;
    input.coupon_code = Some(code.clone());

    let result = orders.place_order(None, input).await;
    assert_matches!(result, Err(ServiceError::ExternalService(_)));

    // Full compensation: stock restored, coupon usage reverted, no order rows.
    assert_eq!(
        app.state
            .services
            .inventory
            .get_stock(variant)
            .await
            .expect("stock"),
        10
    );
    let coupon = coupon_by_code(&app, &code).await;
    assert_eq!(coupon.used_count, 0);
    assert!(Order::find().all(&*app.state.db).await.expect("query").is_empty());
    assert!(OrderItem::find().all(&*app.state.db).await.expect("query").is_empty());
}

#[tokio::test]
async fn checkout_clears_the_source_cart_only_when_the_policy_says_so() {
    let app = TestApp::with_config(|cfg| {
        cfg.checkout.clear_cart_after_checkout = true;
    })
    .await;
    let cart = &app.state.services.cart;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Classic Tee", dec!(30.00), None, 10).await;

    let owner = storefront_api::services::CartOwner::Guest {
        session_id: "sess-1".to_string(),
    };
    let view = cart.add_item(&owner, variant, 2).await.expect("add");

    let mut input = place_order_input(vec![(variant, 2)]);
    input.cart_id = Some(view.cart_id);
    orders.place_order(None, input).await.expect("placement");

    let view = cart.get_cart(&owner).await.expect("reread");
    assert!(view.items.is_empty(), "policy-on clears the source cart");
}

#[tokio::test]
async fn checkout_leaves_the_cart_alone_by_default() {
    let app = TestApp::new().await;
    let cart = &app.state.services.cart;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Classic Tee", dec!(30.00), None, 10).await;

    let owner = storefront_api::services::CartOwner::Guest {
        session_id: "sess-1".to_string(),
    };
    let view = cart.add_item(&owner, variant, 2).await.expect("add");

    let mut input = place_order_input(vec![(variant, 2)]);
    input.cart_id = Some(view.cart_id);
    orders.place_order(None, input).await.expect("placement");

    let view = cart.get_cart(&owner).await.expect("reread");
    assert_eq!(view.items.len(), 1, "default policy keeps the cart");
}
