use serde::{Deserialize, Serialize};

use crate::{
    cpe_api::settlement_objects::SettlementSummary,
    db_types::{LedgerTransaction, Money, Order},
};

/// Published once per order, after the order has been settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceededEvent {
    pub order: Order,
    pub summary: SettlementSummary,
}

impl PaymentSucceededEvent {
    pub fn new(order: Order, summary: SettlementSummary) -> Self {
        Self { order, summary }
    }
}

/// Published for every ledger row written by the payment and settlement flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChangedEvent {
    pub user_id: i64,
    pub balance: Money,
    pub transaction: LedgerTransaction,
}

impl BalanceChangedEvent {
    pub fn new(transaction: LedgerTransaction) -> Self {
        Self { user_id: transaction.user_id, balance: transaction.balance_after, transaction }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    PaymentSucceeded(PaymentSucceededEvent),
    BalanceChanged(BalanceChangedEvent),
}
