use chrono::{DateTime, Utc};
use cpg_common::Money;
use thiserror::Error;

use crate::{
    cpe_api::{
        account_objects::LedgerEntry,
        settlement_objects::{SettlementPlan, SettlementWrite},
    },
    db_types::{NewOrder, Order, OrderStatusType, PaymentMethod, PaymentRecord, PaymentStatus},
    traits::{CommissionError, LedgerError, LedgerManagement},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentGatewayError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(String),
    #[error("Order {0} has already been paid")]
    AlreadyPaid(String),
    #[error("Order {order_no} cannot change from {from} to {to}")]
    OrderModificationForbidden { order_no: String, from: OrderStatusType, to: OrderStatusType },
    #[error("Not authorized. {0}")]
    NotAuthorized(String),
    #[error("Invalid order. {0}")]
    InvalidOrder(String),
    #[error("Order amounts must be strictly positive. Got {0}")]
    AmountMustBePositive(Money),
    #[error("The payment notification signature is invalid")]
    InvalidSignature,
    #[error("Payment method {0} is not supported")]
    UnsupportedPaymentMethod(PaymentMethod),
    #[error("Payment method {0} is currently disabled")]
    PaymentMethodDisabled(PaymentMethod),
    #[error("Payment amount mismatch. Expected {expected}, but the provider reported {received}")]
    AmountMismatch { expected: Money, received: Money },
    #[error("Payment record #{0} does not exist")]
    PaymentRecordNotFound(i64),
    #[error("Payment provider error. {0}")]
    ProviderError(String),
    #[error("Settlement error. {0}")]
    SettlementError(String),
    #[error("Order #{0} has already been settled")]
    AlreadySettled(i64),
    #[error("{0}")]
    LedgerError(#[from] LedgerError),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<CommissionError> for PaymentGatewayError {
    fn from(e: CommissionError) -> Self {
        Self::SettlementError(e.to_string())
    }
}

/// This trait defines the highest level of behaviour for backends supporting the payment gateway.
///
/// This behaviour includes:
/// * Order creation, lookup and the order status state machine.
/// * Payment attempt bookkeeping.
/// * The atomic "payment succeeded" transitions that feed settlement.
/// * The settlement writes themselves.
///
/// All status transitions are compare-and-swap operations on the current status, so that concurrent or repeated
/// callers can never both succeed.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + LedgerManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new `PENDING` order under the given (unique) order number.
    async fn insert_order(&self, order: NewOrder, order_no: &str) -> Result<Order, PaymentGatewayError>;

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError>;

    async fn fetch_order_by_order_no(&self, order_no: &str) -> Result<Option<Order>, PaymentGatewayError>;

    /// Orders placed by the user (as buyer), newest first.
    async fn fetch_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, PaymentGatewayError>;

    /// Atomically moves the order from `PENDING` to `PAID`.
    ///
    /// Returns [`PaymentGatewayError::AlreadyPaid`] if the order was not `PENDING`, and leaves it untouched.
    async fn mark_order_paid(
        &self,
        order_id: i64,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<Order, PaymentGatewayError>;

    /// Atomically moves the order from `PENDING` to `CANCELLED`.
    async fn cancel_order(&self, order_id: i64) -> Result<Order, PaymentGatewayError>;

    /// Atomically moves the order from `PAID` to `REFUNDED`. Ledger entries are not reversed.
    async fn refund_order(&self, order_id: i64, reason: &str) -> Result<Order, PaymentGatewayError>;

    async fn insert_payment_record(
        &self,
        order: &Order,
        method: PaymentMethod,
    ) -> Result<PaymentRecord, PaymentGatewayError>;

    async fn update_payment_record_status(
        &self,
        record_id: i64,
        status: PaymentStatus,
    ) -> Result<PaymentRecord, PaymentGatewayError>;

    async fn fetch_payment_records_for_order(&self, order_id: i64) -> Result<Vec<PaymentRecord>, PaymentGatewayError>;

    /// Handles a successful third-party payment in a single atomic transaction:
    /// * The order identified by `order_no` moves from `PENDING` to `PAID`.
    /// * The most recent `PENDING` payment record for the order and method is marked `SUCCESS` with the provider's
    ///   reference. If no such record exists (e.g. the intent was created elsewhere), a `SUCCESS` record is created.
    ///
    /// Fails with [`PaymentGatewayError::AlreadyPaid`] if the order was not `PENDING`; nothing changes in that case.
    async fn mark_payment_succeeded(
        &self,
        order_no: &str,
        method: PaymentMethod,
        third_party_order_no: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Order, PaymentRecord), PaymentGatewayError>;

    /// Marks the most recent `PENDING` payment record for the order and method as `FAILED`. The order is left
    /// `PENDING` so that the buyer can try again.
    async fn mark_payment_failed(
        &self,
        order_no: &str,
        method: PaymentMethod,
        third_party_order_no: Option<&str>,
    ) -> Result<Option<PaymentRecord>, PaymentGatewayError>;

    /// Pays for an order from the buyer's balance in a single atomic transaction: the order moves from `PENDING` to
    /// `PAID`, a `SUCCESS` payment record is written, and the buyer is debited. If the buyer's balance is too low,
    /// nothing changes.
    async fn pay_with_balance(
        &self,
        order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(Order, PaymentRecord, LedgerEntry), PaymentGatewayError>;

    /// Performs the author credit and membership extension for a paid order in one transaction.
    ///
    /// The transaction opens by stamping the order's `settled_at`, which can only happen once. A second call for the
    /// same order fails with [`PaymentGatewayError::AlreadySettled`] and writes nothing.
    async fn apply_settlement(&self, plan: SettlementPlan) -> Result<SettlementWrite, PaymentGatewayError>;
}
