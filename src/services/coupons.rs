use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{info, instrument};

use crate::{
    entities::{coupon, coupon::DiscountType, Coupon},
    errors::{CouponRejection, ServiceError},
    events::{Event, EventSender},
};

/// Service for coupon validation and redemption accounting.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Validates a coupon against the order amount and returns the discount
    /// it grants. Unknown codes present the same as inactive ones.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        order_amount: Decimal,
    ) -> Result<Decimal, ServiceError> {
        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::CouponRejected(
                CouponRejection::ExpiredOrInactive,
            ))?;

        if !coupon.is_active {
            return Err(ServiceError::CouponRejected(
                CouponRejection::ExpiredOrInactive,
            ));
        }
        if let Some(expires_at) = coupon.expires_at {
            if expires_at < Utc::now() {
                return Err(ServiceError::CouponRejected(
                    CouponRejection::ExpiredOrInactive,
                ));
            }
        }
        if order_amount < coupon.min_order_amount {
            return Err(ServiceError::CouponRejected(CouponRejection::BelowMinimum {
                min_order_amount: coupon.min_order_amount,
            }));
        }
        if let Some(limit) = coupon.usage_limit {
            if coupon.used_count >= limit {
                return Err(ServiceError::CouponRejected(
                    CouponRejection::UsageLimitReached,
                ));
            }
        }

        Ok(compute_discount(
            coupon.discount_type,
            coupon.discount_value,
            coupon.max_discount_amount,
            order_amount,
        ))
    }

    /// Counts one redemption of the coupon. The increment is conditional on
    /// remaining usage, so concurrent redemptions cannot push `used_count`
    /// past the limit; the loser gets `UsageLimitReached` and the caller
    /// compensates. Called exactly once per placed order.
    #[instrument(skip(self))]
    pub async fn record_usage(&self, code: &str) -> Result<(), ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Code.eq(code))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsedCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::CouponRejected(
                CouponRejection::UsageLimitReached,
            ));
        }

        self.event_sender
            .send_or_log(Event::CouponRedeemed {
                code: code.to_string(),
            })
            .await;

        info!(code, "Recorded coupon redemption");
        Ok(())
    }

    /// Undoes one recorded redemption. Only order-placement compensation
    /// calls this, for a usage recorded by an order that did not survive.
    #[instrument(skip(self))]
    pub async fn revert_usage(&self, code: &str) -> Result<(), ServiceError> {
        Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).sub(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::UsedCount.gt(0))
            .exec(&*self.db)
            .await?;

        info!(code, "Reverted coupon redemption");
        Ok(())
    }
}

/// Percentage discounts are capped by `max_discount_amount` when set; fixed
/// discounts never exceed the order amount.
fn compute_discount(
    discount_type: DiscountType,
    discount_value: Decimal,
    max_discount_amount: Option<Decimal>,
    order_amount: Decimal,
) -> Decimal {
    match discount_type {
        DiscountType::Percentage => {
            let discount = order_amount * discount_value / Decimal::from(100);
            match max_discount_amount {
                Some(cap) => discount.min(cap),
                None => discount,
            }
        }
        DiscountType::Fixed => discount_value.min(order_amount),
    }
}
