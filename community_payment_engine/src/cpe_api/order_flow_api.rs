use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    cpe_api::order_objects::{PaidOrder, Requester},
    db_types::{NewOrder, Order, OrderDetails, OrderStatusType, PaymentMethod, PaymentRecord},
    helpers::new_order_no,
    traits::{LedgerError, PaymentGatewayDatabase, PaymentGatewayError},
};

/// `OrderFlowApi` owns the order state machine: PENDING → PAID → REFUNDED, and PENDING → CANCELLED.
///
/// Every transition is a compare-and-swap on the current status in the backend, so two callers can never both move
/// the same order.
pub struct OrderFlowApi<B> {
    db: B,
}

impl<B: Debug> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({:?})", self.db)
    }
}

impl<B> OrderFlowApi<B>
where B: PaymentGatewayDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Creates a new `PENDING` order with a fresh order number.
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        if !order.amount.is_positive() {
            return Err(PaymentGatewayError::AmountMustBePositive(order.amount));
        }
        validate_details(&order.details)?;
        for user_id in [order.user_id, order.author_id] {
            if self.db.fetch_user_account(user_id).await?.is_none() {
                return Err(LedgerError::AccountNotFound(user_id).into());
            }
        }
        let order_no = new_order_no(Utc::now());
        let order = self.db.insert_order(order, &order_no).await?;
        info!(
            "📝️ {} order [{}] for {} created by user #{} (author #{})",
            order.order_type, order.order_no, order.amount, order.user_id, order.author_id
        );
        Ok(order)
    }

    pub async fn fetch_order(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError> {
        self.db.fetch_order_by_id(id).await
    }

    pub async fn fetch_order_by_order_no(&self, order_no: &str) -> Result<Option<Order>, PaymentGatewayError> {
        self.db.fetch_order_by_order_no(order_no).await
    }

    /// Fetches an order on behalf of `requester`, who must be its buyer, its author or an administrator.
    pub async fn order_for_requester(
        &self,
        order_no: &str,
        requester: Requester,
    ) -> Result<Order, PaymentGatewayError> {
        let order = self
            .db
            .fetch_order_by_order_no(order_no)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.to_string()))?;
        if !requester.can_view(&order) {
            return Err(PaymentGatewayError::NotAuthorized(format!(
                "User #{} may not view order {order_no}",
                requester.user_id
            )));
        }
        Ok(order)
    }

    pub async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, PaymentGatewayError> {
        self.db.fetch_orders_for_user(user_id).await
    }

    pub async fn payment_records(&self, order_id: i64) -> Result<Vec<PaymentRecord>, PaymentGatewayError> {
        self.db.fetch_payment_records_for_order(order_id).await
    }

    /// Moves the order from `PENDING` to `PAID`. Only the caller that wins the transition receives a [`PaidOrder`].
    pub async fn mark_paid(&self, order_id: i64, method: PaymentMethod) -> Result<PaidOrder, PaymentGatewayError> {
        let order = self.db.mark_order_paid(order_id, method, Utc::now()).await?;
        Ok(PaidOrder::new(order))
    }

    /// The buyer cancels an order that has not been paid.
    pub async fn cancel(&self, order_id: i64, requester: Requester) -> Result<Order, PaymentGatewayError> {
        let order = self.require_order(order_id).await?;
        if order.user_id != requester.user_id {
            return Err(PaymentGatewayError::NotAuthorized(format!(
                "Only the buyer can cancel order {}",
                order.order_no
            )));
        }
        let order = self.db.cancel_order(order.id).await?;
        info!("🔄️ Order [{}] cancelled by its buyer", order.order_no);
        Ok(order)
    }

    /// The author or an administrator refunds a paid order. Ledger entries made at settlement are not reversed.
    pub async fn refund(
        &self,
        order_id: i64,
        requester: Requester,
        reason: &str,
    ) -> Result<Order, PaymentGatewayError> {
        let order = self.require_order(order_id).await?;
        if !(requester.is_admin || order.author_id == requester.user_id) {
            return Err(PaymentGatewayError::NotAuthorized(format!(
                "Only the author or an administrator can refund order {}",
                order.order_no
            )));
        }
        if order.status != OrderStatusType::Paid {
            return Err(PaymentGatewayError::OrderModificationForbidden {
                order_no: order.order_no,
                from: order.status,
                to: OrderStatusType::Refunded,
            });
        }
        let order = self.db.refund_order(order.id, reason).await?;
        let (order_no, user_id) = (&order.order_no, requester.user_id);
        warn!("🔄️ Order [{order_no}] refunded by user #{user_id}. Settlement credits stay in place.");
        Ok(order)
    }

    async fn require_order(&self, order_id: i64) -> Result<Order, PaymentGatewayError> {
        self.db
            .fetch_order_by_id(order_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(format!("#{order_id}")))
    }
}

fn validate_details(details: &OrderDetails) -> Result<(), PaymentGatewayError> {
    match details {
        OrderDetails::Membership { level, duration_months, is_lifetime } => {
            if *level <= 0 {
                let msg = format!("Membership level must be positive. Got {level}");
                return Err(PaymentGatewayError::InvalidOrder(msg));
            }
            if *duration_months == 0 && !is_lifetime {
                return Err(PaymentGatewayError::InvalidOrder(
                    "A membership must either last at least a month or be lifetime".into(),
                ));
            }
        },
        OrderDetails::Product { quantity, .. } if *quantity == 0 => {
            return Err(PaymentGatewayError::InvalidOrder("Product quantity must be at least 1".into()));
        },
        _ => {},
    }
    Ok(())
}
