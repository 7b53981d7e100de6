//! Settlement of paid orders.
//!
//! Settling an order:
//! 1. prices the content split (the platform's commission receipt) and the three-way order split,
//! 2. credits the author and, for membership orders, extends the buyer's membership, in one database transaction,
//! 3. runs the invite cascade as a separate step. Cascade failures are logged and never undo or block settlement.
//! 4. publishes `BalanceChanged` and `PaymentSucceeded` events.
//!
//! Settlement only accepts a [`PaidOrder`], and the database refuses to settle an order twice, so a redelivered
//! payment notification cannot pay anyone a second time.
use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    cpe_api::{
        account_objects::LedgerRequest,
        commission_api::{content_split, order_split, CommissionApi},
        invite_api::InviteApi,
        invite_objects::CascadePayout,
        order_objects::PaidOrder,
        settlement_objects::{MembershipPurchase, SettlementPlan, SettlementSummary},
    },
    db_types::{Money, Order, OrderDetails, OrderStatusType, TransactionType},
    events::{BalanceChangedEvent, EventProducers, PaymentSucceededEvent},
    traits::{CommissionSettings, InviteManagement, LedgerManagement, PaymentGatewayDatabase, PaymentGatewayError},
};

pub struct SettlementApi<B> {
    db: B,
    commission: CommissionApi<B>,
    invites: InviteApi<B>,
    producers: EventProducers,
}

impl<B: Debug> Debug for SettlementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi ({:?})", self.db)
    }
}

impl<B> SettlementApi<B>
where B: PaymentGatewayDatabase + InviteManagement + CommissionSettings
{
    pub fn new(db: B, producers: EventProducers) -> Self {
        let commission = CommissionApi::new(db.clone());
        let invites = InviteApi::new(db.clone()).with_commission_api(commission.clone());
        Self { db, commission, invites, producers }
    }

    /// Shares an existing commission configuration cache, so that configuration updates made through `commission`
    /// take effect here immediately.
    pub fn with_commission_api(mut self, commission: CommissionApi<B>) -> Self {
        self.invites = InviteApi::new(self.db.clone()).with_commission_api(commission.clone());
        self.commission = commission;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn commission_api(&self) -> &CommissionApi<B> {
        &self.commission
    }

    /// Settles an order that the caller has just moved to `PAID`.
    pub async fn settle(&self, order: &PaidOrder) -> Result<SettlementSummary, PaymentGatewayError> {
        let config = self.commission.config().await?;
        let user_override = self.db.fetch_user_override(order.author_id, order.order_type).await?;
        let commission = content_split(&config, user_override.as_ref(), order.amount, order.order_type);
        let split = order_split(&config, order.amount);
        let undistributed = split.undistributed(order.amount);
        if !undistributed.is_zero() {
            debug!("🔄️ {undistributed} of order [{}] is not distributed by the settlement rates", order.order_no);
        }

        let author_credit = split.author_amount.is_positive().then(|| {
            LedgerRequest::new(
                order.author_id,
                split.author_amount,
                TransactionType::Commission,
                format!("Author earnings for order {}", order.order_no),
            )
            .with_order(order.id)
        });
        let membership = membership_purchase(order);
        let plan = SettlementPlan { order_id: order.id, author_credit, membership, now: Utc::now() };
        let write = self.db.apply_settlement(plan).await?;
        if let Some(entry) = &write.author_entry {
            info!("🔄️ Author #{} credited {} for order [{}]", order.author_id, split.author_amount, order.order_no);
            self.producers.publish_balance_changed(BalanceChangedEvent::new(entry.transaction.clone())).await;
        }

        let cascade = self.run_cascade(order, split.inviter_amount).await;
        if let Some(CascadePayout { credit: Some(entry), .. }) = &cascade {
            self.producers.publish_balance_changed(BalanceChangedEvent::new(entry.transaction.clone())).await;
        }

        let summary = SettlementSummary {
            order_id: order.id,
            order_no: order.order_no.clone(),
            commission,
            order_split: split,
            author_balance: write.author_entry.as_ref().map(|e| e.balance),
            author_transaction: write.author_entry.map(|e| e.transaction),
            invite_commission: cascade.map(|c| c.record),
            membership: write.membership,
            replayed: false,
        };
        let event = PaymentSucceededEvent::new(order.order().clone(), summary.clone());
        self.producers.publish_payment_succeeded(event).await;
        info!("🔄️ Order [{}] settled", order.order_no);
        Ok(summary)
    }

    /// Reconstructs the settlement summary for an order that has already been settled, without changing anything.
    ///
    /// Returns `None` if the order was never paid. The splits are priced from the current configuration.
    pub async fn prior_settlement(&self, order: &Order) -> Result<Option<SettlementSummary>, PaymentGatewayError> {
        if !matches!(order.status, OrderStatusType::Paid | OrderStatusType::Refunded) {
            return Ok(None);
        }
        let config = self.commission.config().await?;
        let user_override = self.db.fetch_user_override(order.author_id, order.order_type).await?;
        let commission = content_split(&config, user_override.as_ref(), order.amount, order.order_type);
        let split = order_split(&config, order.amount);
        // The author credit is the first COMMISSION row for the author on this order
        let author_transaction = self
            .db
            .fetch_transactions_for_order(order.id)
            .await?
            .into_iter()
            .find(|tx| tx.user_id == order.author_id && tx.tx_type == TransactionType::Commission);
        let invite_commission = self
            .db
            .fetch_commission_record_for_order(order.id)
            .await
            .map_err(|e| PaymentGatewayError::SettlementError(e.to_string()))?;
        let membership = match membership_purchase(order) {
            Some(purchase) => self.db.fetch_user_account(purchase.user_id).await?.map(|u| u.membership()),
            None => None,
        };
        Ok(Some(SettlementSummary {
            order_id: order.id,
            order_no: order.order_no.clone(),
            commission,
            order_split: split,
            author_balance: author_transaction.as_ref().map(|tx| tx.balance_after),
            author_transaction,
            invite_commission,
            membership,
            replayed: true,
        }))
    }

    /// Completes settlement for a paid order whose settlement did not finish, e.g. after a crash between payment and
    /// settlement. If the order has already been settled, only the invite cascade is re-run; it never pays twice.
    pub async fn retry_settlement(&self, order_id: i64) -> Result<SettlementSummary, PaymentGatewayError> {
        let order = self
            .db
            .fetch_order_by_id(order_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(format!("#{order_id}")))?;
        if order.status != OrderStatusType::Paid {
            return Err(PaymentGatewayError::SettlementError(format!(
                "Order {} is {}, only PAID orders can be settled",
                order.order_no, order.status
            )));
        }
        if order.settled_at.is_none() {
            warn!("🔄️ Retrying settlement for order [{}]", order.order_no);
            return self.settle(&PaidOrder::new(order)).await;
        }
        let split = order_split(&self.commission.config().await?, order.amount);
        let paid = PaidOrder::new(order);
        if let Some(CascadePayout { credit: Some(entry), .. }) = self.run_cascade(&paid, split.inviter_amount).await {
            self.producers.publish_balance_changed(BalanceChangedEvent::new(entry.transaction)).await;
        }
        self.prior_settlement(paid.order())
            .await?
            .ok_or_else(|| PaymentGatewayError::SettlementError(format!("Order {} has no settlement", paid.order_no)))
    }

    async fn run_cascade(&self, order: &Order, inviter_share: Money) -> Option<CascadePayout> {
        let result = self
            .invites
            .cascade_commission(order.id, order.order_type, order.amount, order.user_id, inviter_share)
            .await;
        match result {
            Ok(payout) => payout,
            Err(e) => {
                error!("🤝️ Invite cascade for order [{}] failed: {e}. No invite commission this time.", order.order_no);
                None
            },
        }
    }
}

fn membership_purchase(order: &Order) -> Option<MembershipPurchase> {
    match order.details {
        OrderDetails::Membership { level, duration_months, is_lifetime } => Some(MembershipPurchase {
            user_id: order.user_id,
            level,
            duration_months,
            lifetime: is_lifetime,
        }),
        _ => None,
    }
}
