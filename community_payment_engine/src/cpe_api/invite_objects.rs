use chrono::{DateTime, Utc};
use cpg_common::{Money, Rate};
use serde::{Deserialize, Serialize};

use crate::{
    cpe_api::account_objects::LedgerEntry,
    db_types::{InviteCommissionRecord, InviteKind, InviteLink},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInviteLink {
    pub inviter_id: i64,
    pub code: String,
    pub kind: InviteKind,
    pub commission_rate: Rate,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A cascade payout that is about to be recorded for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInviteCommission {
    pub invite_id: i64,
    pub inviter_id: i64,
    pub invitee_id: i64,
    pub order_id: i64,
    pub order_amount: Money,
    pub commission_rate: Rate,
    pub commission_amount: Money,
}

impl NewInviteCommission {
    /// Prices a cascade payout from the invite link's own rate.
    pub fn for_order(invite: &InviteLink, invitee_id: i64, order_id: i64, order_amount: Money) -> Self {
        let commission_rate = invite.commission_rate;
        Self {
            invite_id: invite.id,
            inviter_id: invite.inviter_id,
            invitee_id,
            order_id,
            order_amount,
            commission_rate,
            commission_amount: order_amount.apply_rate(commission_rate),
        }
    }
}

/// The result of running the invite cascade for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePayout {
    pub record: InviteCommissionRecord,
    /// The inviter's ledger entry, if this call performed the credit. `None` when the payout had already been made.
    pub credit: Option<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteStats {
    pub inviter_id: i64,
    pub personal_invite_code: String,
    pub invite_count: i64,
    /// Sum of PAID cascade payouts
    pub total_commission: Money,
    /// Sum of PENDING cascade payouts
    pub pending_commission: Money,
    pub invites: Vec<InviteLink>,
    pub records: Vec<InviteCommissionRecord>,
}
