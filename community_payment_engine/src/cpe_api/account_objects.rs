use cpg_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{LedgerTransaction, TransactionType};

/// Which way a ledger mutation moves money. Callers always supply a positive amount; the direction supplies the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerDirection {
    Debit,
    Credit,
}

/// A request to debit or credit a user's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRequest {
    pub user_id: i64,
    /// Must be strictly positive
    pub amount: Money,
    pub tx_type: TransactionType,
    pub description: String,
    pub order_id: Option<i64>,
    pub payment_id: Option<i64>,
}

impl LedgerRequest {
    pub fn new<S: Into<String>>(user_id: i64, amount: Money, tx_type: TransactionType, description: S) -> Self {
        Self { user_id, amount, tx_type, description: description.into(), order_id: None, payment_id: None }
    }

    pub fn with_order(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_payment(mut self, payment_id: i64) -> Self {
        self.payment_id = Some(payment_id);
        self
    }
}

/// The result of a successful ledger mutation: the new balance, and the transaction row that recorded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub balance: Money,
    pub transaction: LedgerTransaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: i64,
    pub count: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { offset: 0, count: 50 }
    }
}

impl Pagination {
    pub const MAX_PAGE_SIZE: i64 = 200;

    /// Builds a pagination window from 1-based page numbers, clamping the page size to [`Self::MAX_PAGE_SIZE`].
    /// Pages too far out to address saturate to the largest offset, which is always an empty page.
    pub fn page(page: i64, size: i64) -> Self {
        let count = size.clamp(1, Self::MAX_PAGE_SIZE);
        let offset = (page.max(1) - 1).saturating_mul(count);
        Self { offset, count }
    }
}

/// Compares the cached balance on the user record with the sum of every ledger row for that user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub user_id: i64,
    pub balance: Money,
    pub ledger_sum: Money,
    pub consistent: bool,
}

#[cfg(test)]
mod test {
    use super::Pagination;

    #[test]
    fn pages() {
        assert_eq!(Pagination::page(1, 20), Pagination { offset: 0, count: 20 });
        assert_eq!(Pagination::page(3, 20), Pagination { offset: 40, count: 20 });
        assert_eq!(Pagination::page(0, 1000), Pagination { offset: 0, count: 200 });
        assert_eq!(Pagination::page(i64::MAX, 10), Pagination { offset: i64::MAX, count: 10 });
        assert_eq!(Pagination::page(i64::MIN, i64::MIN), Pagination { offset: 0, count: 1 });
    }
}
