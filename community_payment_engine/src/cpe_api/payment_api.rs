//! The payment gateway: turns a payment request into a provider intent, and a provider notification into a paid and
//! settled order.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use chrono::Utc;
use log::*;

use crate::{
    cpe_api::{
        commission_api::CommissionApi,
        order_objects::{PaidOrder, Requester},
        payment_objects::{
            IntentAction,
            NotifyOutcome,
            NotifyRequest,
            NotifyStatus,
            PaymentGatewayConfig,
            PaymentIntent,
            ProviderNotification,
        },
        settlement_api::SettlementApi,
        settlement_objects::SettlementSummary,
    },
    db_types::{Order, OrderStatusType, PaymentMethod, PaymentStatus},
    events::{BalanceChangedEvent, EventProducers},
    providers::PaymentProvider,
    traits::{CommissionSettings, InviteManagement, PaymentGatewayDatabase, PaymentGatewayError},
};

pub struct PaymentApi<B> {
    db: B,
    settlement: SettlementApi<B>,
    providers: HashMap<PaymentMethod, Arc<dyn PaymentProvider>>,
    config: PaymentGatewayConfig,
    producers: EventProducers,
}

impl<B: Debug> Debug for PaymentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi ({:?})", self.db)
    }
}

impl<B> PaymentApi<B>
where B: PaymentGatewayDatabase + InviteManagement + CommissionSettings
{
    pub fn new(db: B, producers: EventProducers) -> Self {
        let settlement = SettlementApi::new(db.clone(), producers.clone());
        Self { db, settlement, providers: HashMap::new(), config: PaymentGatewayConfig::default(), producers }
    }

    pub fn with_config(mut self, config: PaymentGatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_commission_api(mut self, commission: CommissionApi<B>) -> Self {
        self.settlement = self.settlement.with_commission_api(commission);
        self
    }

    /// Registers the adapter for the provider's payment method, replacing any previous one.
    pub fn with_provider<P: PaymentProvider + 'static>(self, provider: P) -> Self {
        self.with_shared_provider(Arc::new(provider))
    }

    /// Like [`Self::with_provider`], for adapters that are shared between several `PaymentApi` instances.
    pub fn with_shared_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        let method = provider.method();
        if method == PaymentMethod::Balance {
            warn!("💳️ Balance payments never go through a provider. Ignoring the provider registration.");
            return self;
        }
        self.providers.insert(method, provider);
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn settlement(&self) -> &SettlementApi<B> {
        &self.settlement
    }

    pub fn config(&self) -> &PaymentGatewayConfig {
        &self.config
    }

    /// Starts a payment attempt for an order.
    ///
    /// Balance payments complete immediately: the buyer is debited, the order is paid and settled, and the returned
    /// intent carries the settlement. Third-party methods leave a `PENDING` payment record and return the redirect or
    /// QR payload from the provider. If the provider fails, the record is marked `FAILED`.
    pub async fn create_intent(
        &self,
        order_id: i64,
        requester: Requester,
        method: PaymentMethod,
    ) -> Result<PaymentIntent, PaymentGatewayError> {
        if !self.config.is_enabled(method) {
            return Err(PaymentGatewayError::PaymentMethodDisabled(method));
        }
        let order = self
            .db
            .fetch_order_by_id(order_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(format!("#{order_id}")))?;
        if order.user_id != requester.user_id {
            let msg = format!("Only the buyer can pay for order {}", order.order_no);
            return Err(PaymentGatewayError::NotAuthorized(msg));
        }
        match order.status {
            OrderStatusType::Pending => {},
            OrderStatusType::Paid => return Err(PaymentGatewayError::AlreadyPaid(order.order_no)),
            from => {
                return Err(PaymentGatewayError::OrderModificationForbidden {
                    order_no: order.order_no,
                    from,
                    to: OrderStatusType::Paid,
                })
            },
        }
        if method == PaymentMethod::Balance {
            return self.pay_with_balance(order).await;
        }
        let provider = self.providers.get(&method).ok_or(PaymentGatewayError::UnsupportedPaymentMethod(method))?;
        let record = self.db.insert_payment_record(&order, method).await?;
        match provider.create_intent(&order, &record) {
            Ok(action) => {
                info!("💳️ {method} payment attempt #{} started for order [{}]", record.id, order.order_no);
                Ok(PaymentIntent { record, action, settlement: None })
            },
            Err(e) => {
                warn!("💳️ {method} could not create an intent for order [{}]. {e}", order.order_no);
                if let Err(e2) = self.db.update_payment_record_status(record.id, PaymentStatus::Failed).await {
                    error!("💳️ Could not mark payment record #{} as failed. {e2}", record.id);
                }
                Err(e)
            },
        }
    }

    async fn pay_with_balance(&self, order: Order) -> Result<PaymentIntent, PaymentGatewayError> {
        let (order, record, entry) = self.db.pay_with_balance(order.id, Utc::now()).await?;
        info!("💳️ Order [{}] paid from the balance of user #{}", order.order_no, order.user_id);
        self.producers.publish_balance_changed(BalanceChangedEvent::new(entry.transaction)).await;
        let summary = self.settle_paid(PaidOrder::new(order)).await?;
        Ok(PaymentIntent { record, action: IntentAction::Completed, settlement: summary })
    }

    /// Handles an asynchronous notification from the provider for `method`.
    ///
    /// Nothing is changed unless the signature verifies. Redelivered success notifications are reported as
    /// duplicates and never settle a second time. A redelivery for an order whose settlement did not complete
    /// finishes that settlement.
    pub async fn handle_notify(
        &self,
        method: PaymentMethod,
        request: &NotifyRequest,
    ) -> Result<NotifyOutcome, PaymentGatewayError> {
        let provider = self.providers.get(&method).ok_or(PaymentGatewayError::UnsupportedPaymentMethod(method))?;
        if !provider.verify_notify(request) {
            warn!("🔐️ Rejected a {method} notification with an invalid signature");
            return Err(PaymentGatewayError::InvalidSignature);
        }
        if !self.config.is_enabled(method) {
            info!("💳️ Processing a {method} notification although the method is disabled for new payments");
        }
        let notification = provider.parse_notify(request)?;
        let order = self
            .db
            .fetch_order_by_order_no(&notification.out_trade_no)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(notification.out_trade_no.clone()))?;
        if let Some(received) = notification.amount {
            if received != order.amount {
                warn!("💳️ {method} reported {received} for order [{}], which costs {}", order.order_no, order.amount);
                return Err(PaymentGatewayError::AmountMismatch { expected: order.amount, received });
            }
        }
        let outcome = |status: NotifyStatus, duplicate: bool, settlement: Option<SettlementSummary>| NotifyOutcome {
            method,
            order_no: order.order_no.clone(),
            status,
            duplicate,
            settlement,
        };
        match notification.status {
            NotifyStatus::Pending => {
                debug!("💳️ {method} notification for order [{}] is not final. Nothing to do", order.order_no);
                Ok(outcome(NotifyStatus::Pending, false, None))
            },
            NotifyStatus::Failed => {
                let trade_no = notification.trade_no.as_deref();
                let record = self.db.mark_payment_failed(&order.order_no, method, trade_no).await?;
                match record {
                    Some(r) => info!("💳️ {method} payment attempt #{} for order [{}] failed", r.id, order.order_no),
                    None => debug!("💳️ No pending {method} attempt for order [{}] to fail", order.order_no),
                }
                Ok(outcome(NotifyStatus::Failed, order.status != OrderStatusType::Pending, None))
            },
            NotifyStatus::Success => {
                let (duplicate, settlement) = self.complete_payment(method, &notification).await?;
                Ok(outcome(NotifyStatus::Success, duplicate, settlement))
            },
        }
    }

    async fn complete_payment(
        &self,
        method: PaymentMethod,
        notification: &ProviderNotification,
    ) -> Result<(bool, Option<SettlementSummary>), PaymentGatewayError> {
        let order_no = notification.out_trade_no.as_str();
        let paid =
            self.db.mark_payment_succeeded(order_no, method, notification.trade_no.as_deref(), Utc::now()).await;
        match paid {
            Ok((order, record)) => {
                info!("💳️ {method} payment #{} for order [{order_no}] succeeded", record.id);
                let summary = self.settle_paid(PaidOrder::new(order)).await?;
                Ok((false, summary))
            },
            Err(PaymentGatewayError::AlreadyPaid(_)) => {
                info!("💳️ Duplicate {method} success notification for order [{order_no}]");
                let order = self
                    .db
                    .fetch_order_by_order_no(order_no)
                    .await?
                    .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.to_string()))?;
                self.settlement_for_duplicate(order).await.map(|s| (true, s))
            },
            Err(e) => Err(e),
        }
    }

    /// Settles an order this call moved to `PAID`. A redelivered notification may already have finished the
    /// settlement through [`SettlementApi::retry_settlement`]; that settlement is then reported instead.
    async fn settle_paid(&self, paid: PaidOrder) -> Result<Option<SettlementSummary>, PaymentGatewayError> {
        match self.settlement.settle(&paid).await {
            Ok(summary) => Ok(Some(summary)),
            Err(PaymentGatewayError::AlreadySettled(_)) => {
                info!("🔄️ Order [{}] was settled by a concurrent delivery", paid.order_no);
                let order = self.db.fetch_order_by_id(paid.id).await?.unwrap_or_else(|| paid.into_inner());
                self.settlement.prior_settlement(&order).await
            },
            Err(e) => Err(e),
        }
    }

    async fn settlement_for_duplicate(&self, order: Order) -> Result<Option<SettlementSummary>, PaymentGatewayError> {
        if order.status != OrderStatusType::Paid || order.settled_at.is_some() {
            return self.settlement.prior_settlement(&order).await;
        }
        warn!("💳️ Order [{}] was paid but never settled. Settling it now.", order.order_no);
        match self.settlement.retry_settlement(order.id).await {
            Ok(summary) => Ok(Some(summary)),
            // A concurrent delivery got there first
            Err(PaymentGatewayError::AlreadySettled(_)) => self.settlement.prior_settlement(&order).await,
            Err(e) => Err(e),
        }
    }
}
