use chrono::{DateTime, Utc};
use cpg_common::Money;
use serde::{Deserialize, Serialize};

use crate::{
    cpe_api::{
        account_objects::{LedgerEntry, LedgerRequest},
        commission_objects::{ContentSplit, OrderSplit},
    },
    db_types::{InviteCommissionRecord, LedgerTransaction, Membership},
};

/// A membership purchase to apply to the buyer as part of settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPurchase {
    pub user_id: i64,
    pub level: i64,
    pub duration_months: u32,
    pub lifetime: bool,
}

/// The writes that settlement performs in a single database transaction: the author credit and, for membership
/// orders, the membership extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub order_id: i64,
    pub author_credit: Option<LedgerRequest>,
    pub membership: Option<MembershipPurchase>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementWrite {
    pub author_entry: Option<LedgerEntry>,
    pub membership: Option<Membership>,
}

/// Everything that happened when an order was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub order_id: i64,
    pub order_no: String,
    /// The content-type split, recorded as a receipt of the platform commission on the sale
    pub commission: ContentSplit,
    pub order_split: OrderSplit,
    /// The author's balance immediately after the author credit was committed
    pub author_balance: Option<Money>,
    pub author_transaction: Option<LedgerTransaction>,
    pub invite_commission: Option<InviteCommissionRecord>,
    pub membership: Option<Membership>,
    /// True when this summary was reconstructed for a redelivered payment notification
    pub replayed: bool,
}
