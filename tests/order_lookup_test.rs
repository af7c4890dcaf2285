mod common;

use assert_matches::assert_matches;
use common::{place_order_input, TestApp};
use rust_decimal_macros::dec;
use storefront_api::{errors::ServiceError, services::orders::LookupOrderInput};
use uuid::Uuid;

#[tokio::test]
async fn guest_orders_are_visible_to_any_caller() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Classic Tee", dec!(30.00), None, 10).await;

    let placement = orders
        .place_order(None, place_order_input(vec![(variant, 1)]))
        .await
        .expect("placement");

    // Anonymous caller and an unrelated signed-in caller both see it.
    let anonymous = orders.get_order(placement.order_id, None).await;
    let stranger = orders
        .get_order(placement.order_id, Some(Uuid::new_v4()))
        .await;

    assert!(anonymous.is_ok());
    assert!(stranger.is_ok());
}

#[tokio::test]
async fn owned_orders_are_visible_only_to_their_owner() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Classic Tee", dec!(30.00), None, 10).await;
    let owner = Uuid::new_v4();

    let placement = orders
        .place_order(Some(owner), place_order_input(vec![(variant, 1)]))
        .await
        .expect("placement");

    assert!(orders.get_order(placement.order_id, Some(owner)).await.is_ok());

    assert_matches!(
        orders.get_order(placement.order_id, None).await,
        Err(ServiceError::AccessDenied(_))
    );
    assert_matches!(
        orders
            .get_order(placement.order_id, Some(Uuid::new_v4()))
            .await,
        Err(ServiceError::AccessDenied(_))
    );
}

#[tokio::test]
async fn missing_orders_are_not_found() {
    let app = TestApp::new().await;

    assert_matches!(
        app.state
            .services
            .orders
            .get_order(Uuid::new_v4(), None)
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn lookup_requires_a_contact_field() {
    let app = TestApp::new().await;

    let result = app
        .state
        .services
        .orders
        .lookup_order(LookupOrderInput {
            order_number: "ORD-ABCDEF123456".into(),
            email: None,
            phone: None,
        })
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn lookup_matches_on_number_plus_contact() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Classic Tee", dec!(30.00), None, 10).await;

    let placement = orders
        .place_order(None, place_order_input(vec![(variant, 2)]))
        .await
        .expect("placement");

    // Email match (case-insensitive).
    let by_email = orders
        .lookup_order(LookupOrderInput {
            order_number: placement.order_number.clone(),
            email: Some("ADA@example.com".into()),
            phone: None,
        })
        .await
        .expect("lookup by email");
    assert_eq!(by_email.order_number, placement.order_number);
    assert_eq!(by_email.items.len(), 1);
    assert_eq!(by_email.items[0].quantity, 2);

    // Phone match.
    let by_phone = orders
        .lookup_order(LookupOrderInput {
            order_number: placement.order_number.clone(),
            email: None,
            phone: Some("5550100".into()),
        })
        .await
        .expect("lookup by phone");
    assert_eq!(by_phone.order_id, placement.order_id);
}

#[tokio::test]
async fn lookup_with_wrong_contact_reveals_nothing() {
    let app = TestApp::new().await;
    let orders = &app.state.services.orders;
    let variant = app.seed_variant("Classic Tee", dec!(30.00), None, 10).await;

    let placement = orders
        .place_order(None, place_order_input(vec![(variant, 1)]))
        .await
        .expect("placement");

    let result = orders
        .lookup_order(LookupOrderInput {
            order_number: placement.order_number,
            email: Some("someone.else@example.com".into()),
            phone: None,
        })
        .await;

    // Indistinguishable from a missing order.
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}
