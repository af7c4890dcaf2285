use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::PaymentConfig,
    entities::{order, order::OrderStatus, order::PaymentStatus, Order},
    errors::ServiceError,
    events::{Event, EventSender},
};

type HmacSha256 = Hmac<Sha256>;

/// Outcome of a confirmation callback. A retried callback for an already
/// paid order is a success, not an error.
#[derive(Debug)]
pub enum PaymentConfirmation {
    Confirmed(order::Model),
    AlreadyConfirmed(order::Model),
}

impl PaymentConfirmation {
    pub fn order(&self) -> &order::Model {
        match self {
            Self::Confirmed(order) | Self::AlreadyConfirmed(order) => order,
        }
    }
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct ConfirmPaymentInput {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
    pub order_id: Uuid,
}

/// Service for the payment gateway boundary: verifying signed confirmation
/// callbacks and creating gateway orders for online checkouts.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    callback_secret: String,
    currency: String,
    gateway: Option<GatewayClient>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: &PaymentConfig,
    ) -> Result<Self, ServiceError> {
        let gateway = match (&config.gateway_base_url, &config.gateway_key_id, &config.gateway_key_secret)
        {
            (Some(base_url), Some(key_id), Some(key_secret)) => Some(GatewayClient::new(
                base_url.clone(),
                key_id.clone(),
                key_secret.clone(),
                Duration::from_secs(config.request_timeout_secs),
            )?),
            _ => None,
        };

        Ok(Self {
            db,
            event_sender,
            callback_secret: config.callback_secret.clone(),
            currency: config.currency.clone(),
            gateway,
        })
    }

    /// Processes a gateway confirmation callback exactly once.
    ///
    /// The signature is the sole authentication of the callback. The
    /// `pending -> paid` transition is guarded at the store, so an order is
    /// confirmed at most once no matter how many times the gateway retries
    /// delivery or how callbacks interleave.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn confirm_payment(
        &self,
        input: ConfirmPaymentInput,
    ) -> Result<PaymentConfirmation, ServiceError> {
        if !self.verify_signature(
            &input.gateway_order_id,
            &input.gateway_payment_id,
            &input.signature,
        ) {
            warn!(
                order_id = %input.order_id,
                gateway_order_id = %input.gateway_order_id,
                "Payment callback signature verification failed"
            );
            return Err(ServiceError::InvalidSignature);
        }

        let order = Order::find_by_id(input.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", input.order_id)))?;

        if order.payment_status == PaymentStatus::Paid {
            info!(order_id = %order.id, "Payment already confirmed");
            return Ok(PaymentConfirmation::AlreadyConfirmed(order));
        }

        let result = Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Paid),
            )
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Confirmed))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(input.order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // Lost the race to a concurrent callback, or the order is gone.
            return match Order::find_by_id(input.order_id).one(&*self.db).await? {
                Some(order) if order.payment_status == PaymentStatus::Paid => {
                    Ok(PaymentConfirmation::AlreadyConfirmed(order))
                }
                Some(order) => Err(ServiceError::ValidationError(format!(
                    "Order {} payment is not confirmable",
                    order.id
                ))),
                None => Err(ServiceError::NotFound(format!(
                    "Order {} not found",
                    input.order_id
                ))),
            };
        }

        let order = Order::find_by_id(input.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", input.order_id)))?;

        self.event_sender
            .send_or_log(Event::OrderPaymentConfirmed(order.id))
            .await;

        info!(order_id = %order.id, "Payment confirmed");
        Ok(PaymentConfirmation::Confirmed(order))
    }

    /// Creates a gateway order for an online checkout, converting the total
    /// to minor units. Returns `None` when no gateway is configured.
    #[instrument(skip(self))]
    pub async fn create_gateway_order(
        &self,
        amount: Decimal,
        receipt: &str,
    ) -> Result<Option<String>, ServiceError> {
        let Some(gateway) = &self.gateway else {
            return Ok(None);
        };

        let amount_minor = (amount * Decimal::from(100)).to_i64().ok_or_else(|| {
            ServiceError::ValidationError("Order amount out of range".to_string())
        })?;

        let gateway_order_id = gateway
            .create_order(amount_minor, &self.currency, receipt)
            .await?;
        Ok(Some(gateway_order_id))
    }

    fn verify_signature(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        let mut mac = HmacSha256::new_from_slice(self.callback_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(format!("{}|{}", gateway_order_id, gateway_payment_id).as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());
        constant_time_eq(&expected, signature)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Minimal client for the external payment gateway's order-creation call.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

#[derive(Serialize)]
struct GatewayOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Deserialize)]
struct GatewayOrderResponse {
    id: String,
}

impl GatewayClient {
    pub fn new(
        base_url: String,
        key_id: String,
        key_secret: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to build gateway client: {}", e))
            })?;
        Ok(Self {
            http,
            base_url,
            key_id,
            key_secret,
        })
    }

    /// Creates a gateway order and returns its id. Timeouts and transport
    /// failures surface as retryable external-service errors.
    pub async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&GatewayOrderRequest {
                amount: amount_minor,
                currency,
                receipt,
            })
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("gateway request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalService(format!(
                "gateway order creation returned {}",
                response.status()
            )));
        }

        let body: GatewayOrderResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalService(format!("gateway response malformed: {}", e))
        })?;
        Ok(body.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("abcdef", "abcdef"));
        assert!(!constant_time_eq("abcdef", "abcdeg"));
        assert!(!constant_time_eq("abc", "abcdef"));
    }

    #[test]
    fn signature_roundtrip() {
        let mut mac = HmacSha256::new_from_slice(b"callback_secret_for_tests")
            .expect("HMAC accepts keys of any length");
        mac.update(b"gw_order_1|gw_pay_1");
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut mac = HmacSha256::new_from_slice(b"callback_secret_for_tests")
            .expect("HMAC accepts keys of any length");
        mac.update(format!("{}|{}", "gw_order_1", "gw_pay_1").as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        assert!(constant_time_eq(&expected, &signature));
    }
}
