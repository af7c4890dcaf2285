mod common;

use assert_matches::assert_matches;
use common::{place_order_input, TestApp, TEST_CALLBACK_SECRET};
use hmac::{Hmac, Mac};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use sha2::Sha256;
use storefront_api::{
    entities::{order, Order},
    errors::ServiceError,
    services::{ConfirmPaymentInput, PaymentConfirmation},
};
use uuid::Uuid;

fn sign(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(TEST_CALLBACK_SECRET.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{}|{}", gateway_order_id, gateway_payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

async fn place_test_order(app: &TestApp) -> Uuid {
    let variant = app.seed_variant("Classic Tee", dec!(30.00), None, 10).await;
    let mut input = place_order_input(vec![(variant, 2)]);
    input.payment_method = order::PaymentMethod::Online;
    app.state
        .services
        .orders
        .place_order(None, input)
        .await
        .expect("placement should succeed")
        .order_id
}

#[tokio::test]
async fn valid_callback_confirms_the_order_once() {
    let app = TestApp::new().await;
    let order_id = place_test_order(&app).await;

    let confirmation = app
        .state
        .services
        .payments
        .confirm_payment(ConfirmPaymentInput {
            gateway_order_id: "gw_order_1".into(),
            gateway_payment_id: "gw_pay_1".into(),
            signature: sign("gw_order_1", "gw_pay_1"),
            order_id,
        })
        .await
        .expect("confirmation should succeed");

    assert_matches!(confirmation, PaymentConfirmation::Confirmed(_));

    let order = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .expect("query")
        .expect("order exists");
    assert_eq!(order.payment_status, order::PaymentStatus::Paid);
    assert_eq!(order.status, order::OrderStatus::Confirmed);
}

#[tokio::test]
async fn retried_callback_is_an_idempotent_no_op() {
    let app = TestApp::new().await;
    let order_id = place_test_order(&app).await;

    let input = ConfirmPaymentInput {
        gateway_order_id: "gw_order_1".into(),
        gateway_payment_id: "gw_pay_1".into(),
        signature: sign("gw_order_1", "gw_pay_1"),
        order_id,
    };

    let first = app
        .state
        .services
        .payments
        .confirm_payment(input.clone())
        .await
        .expect("first confirmation");
    let updated_at_after_first = first.order().updated_at;

    let second = app
        .state
        .services
        .payments
        .confirm_payment(input)
        .await
        .expect("second confirmation");

    assert_matches!(first, PaymentConfirmation::Confirmed(_));
    assert_matches!(second, PaymentConfirmation::AlreadyConfirmed(_));

    // The retry mutated nothing.
    let order = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .expect("query")
        .expect("order exists");
    assert_eq!(order.payment_status, order::PaymentStatus::Paid);
    assert_eq!(order.updated_at, updated_at_after_first);
}

#[tokio::test]
async fn tampered_signature_is_rejected_and_order_untouched() {
    let app = TestApp::new().await;
    let order_id = place_test_order(&app).await;

    let result = app
        .state
        .services
        .payments
        .confirm_payment(ConfirmPaymentInput {
            gateway_order_id: "gw_order_1".into(),
            gateway_payment_id: "gw_pay_1".into(),
            signature: sign("gw_order_1", "gw_pay_TAMPERED"),
            order_id,
        })
        .await;

    assert_matches!(result, Err(ServiceError::InvalidSignature));

    let order = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .expect("query")
        .expect("order exists");
    assert_eq!(order.payment_status, order::PaymentStatus::Pending);
    assert_eq!(order.status, order::OrderStatus::Pending);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;

    let result = app
        .state
        .services
        .payments
        .confirm_payment(ConfirmPaymentInput {
            gateway_order_id: "gw_order_1".into(),
            gateway_payment_id: "gw_pay_1".into(),
            signature: sign("gw_order_1", "gw_pay_1"),
            order_id: Uuid::new_v4(),
        })
        .await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
}
