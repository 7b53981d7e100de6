//! The inviter → invitee graph and the one-off commission cascade paid to inviters.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    cpe_api::{
        commission_api::{validate_rate, CommissionApi},
        invite_objects::{CascadePayout, InviteStats, NewInviteCommission, NewInviteLink},
    },
    db_types::{InviteCommissionStatus, InviteKind, InviteLink, Money, OrderType, Rate},
    helpers::{is_valid_invite_code, new_invite_code},
    traits::{CommissionSettings, InviteError, InviteManagement, LedgerManagement},
};

pub const DEFAULT_INVITE_TTL_DAYS: i64 = 7;
/// The longest lifetime a disposable code can be given.
pub const MAX_INVITE_TTL_DAYS: i64 = 3_650;

pub struct InviteApi<B> {
    db: B,
    commission: CommissionApi<B>,
    default_ttl: Option<Duration>,
}

impl<B: Debug> Debug for InviteApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InviteApi ({:?})", self.db)
    }
}

impl<B> InviteApi<B>
where B: InviteManagement + CommissionSettings + LedgerManagement + Clone
{
    pub fn new(db: B) -> Self {
        let commission = CommissionApi::new(db.clone());
        Self { db, commission, default_ttl: Some(Duration::days(DEFAULT_INVITE_TTL_DAYS)) }
    }

    /// Shares an existing commission configuration cache instead of keeping a private one.
    pub fn with_commission_api(mut self, commission: CommissionApi<B>) -> Self {
        self.commission = commission;
        self
    }

    /// Sets how long new disposable codes stay valid. `None` means they never expire.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Creates a single-use invite code for `inviter_id`. The rate and lifetime fall back to the configured defaults.
    pub async fn create_invite_link(
        &self,
        inviter_id: i64,
        commission_rate: Option<Rate>,
        ttl: Option<Duration>,
    ) -> Result<InviteLink, InviteError> {
        if self.db.fetch_user_account(inviter_id).await?.is_none() {
            return Err(InviteError::AccountNotFound(inviter_id));
        }
        let commission_rate = match commission_rate {
            Some(rate) => rate,
            None => self.default_invite_rate().await?,
        };
        validate_rate("invite commission", commission_rate).map_err(|e| InviteError::InvalidRate(e.to_string()))?;
        let expires_at = match ttl.or(self.default_ttl) {
            Some(ttl) => Some(invite_expiry(Utc::now(), ttl)?),
            None => None,
        };
        let link = NewInviteLink {
            inviter_id,
            code: new_invite_code(),
            kind: InviteKind::Disposable,
            commission_rate,
            expires_at,
        };
        let link = self.db.insert_invite_link(link).await?;
        info!("🤝️ User #{inviter_id} created invite code {} at {}", link.code, link.commission_rate);
        Ok(link)
    }

    pub async fn fetch_invite(&self, code: &str) -> Result<Option<InviteLink>, InviteError> {
        self.db.fetch_invite_by_code(code).await
    }

    /// Links `invitee_id` to the owner of `code`. See [`InviteManagement::redeem_invite`] for the failure modes.
    pub async fn redeem(&self, invitee_id: i64, code: &str) -> Result<InviteLink, InviteError> {
        let code = code.trim();
        if !is_valid_invite_code(code) {
            return Err(InviteError::InvalidCode(code.to_string()));
        }
        let default_rate = self.default_invite_rate().await?;
        self.db.redeem_invite(invitee_id, code, default_rate, Utc::now()).await
    }

    /// Pays the buyer's inviter their one-off commission for an order.
    ///
    /// Returns `None` when there is nothing to pay: the buyer has no inviter, there is no `USED` invite link, or the
    /// commission rounds to zero. The amount is priced from the invite link's own rate, so it can differ from
    /// `inviter_share`, the inviter portion of the settlement split. Any difference is logged.
    ///
    /// Calling this more than once for the same order never pays twice.
    pub async fn cascade_commission(
        &self,
        order_id: i64,
        order_type: OrderType,
        order_amount: Money,
        buyer_id: i64,
        inviter_share: Money,
    ) -> Result<Option<CascadePayout>, InviteError> {
        let buyer = self.db.fetch_user_account(buyer_id).await?.ok_or(InviteError::AccountNotFound(buyer_id))?;
        if buyer.inviter_id.is_none() {
            trace!("🤝️ Buyer #{buyer_id} has no inviter. No cascade for order #{order_id}");
            return Ok(None);
        }
        let Some(invite) = self.db.fetch_used_invite_for_invitee(buyer_id).await? else {
            warn!("🤝️ Buyer #{buyer_id} has an inviter but no used invite link. No cascade for order #{order_id}");
            return Ok(None);
        };
        let payout = NewInviteCommission::for_order(&invite, buyer_id, order_id, order_amount);
        if !payout.commission_amount.is_positive() {
            debug!("🤝️ Invite commission for order #{order_id} is {}. Nothing to pay", payout.commission_amount);
            return Ok(None);
        }
        if payout.commission_amount != inviter_share {
            info!(
                "🤝️ Invite commission for {order_type} order #{order_id} is {} at the invite rate of {}, while the \
                 settlement inviter share is {inviter_share}. Paying the invite rate.",
                payout.commission_amount, payout.commission_rate
            );
        }
        let (record, inserted) = self.db.insert_commission_record(payout).await?;
        if !inserted {
            debug!("🤝️ Order #{order_id} already has invite commission record #{}", record.id);
        }
        if record.status != InviteCommissionStatus::Pending {
            return Ok(Some(CascadePayout { record, credit: None }));
        }
        match self.db.pay_commission_record(record.id).await {
            Ok((record, entry)) => {
                info!(
                    "🤝️ User #{} earned {} invite commission on order #{order_id}",
                    record.inviter_id, record.commission_amount
                );
                Ok(Some(CascadePayout { record, credit: Some(entry) }))
            },
            Err(InviteError::CommissionAlreadySettled(_)) => {
                let record = self.db.fetch_commission_record_for_order(order_id).await?.unwrap_or(record);
                Ok(Some(CascadePayout { record, credit: None }))
            },
            Err(e) => Err(e),
        }
    }

    pub async fn stats(&self, inviter_id: i64) -> Result<InviteStats, InviteError> {
        let inviter =
            self.db.fetch_user_account(inviter_id).await?.ok_or(InviteError::AccountNotFound(inviter_id))?;
        let invites = self.db.fetch_invites_for_inviter(inviter_id).await?;
        let records = self.db.fetch_commission_records_for_inviter(inviter_id).await?;
        let sum_with_status = |status: InviteCommissionStatus| -> Money {
            records.iter().filter(|r| r.status == status).map(|r| r.commission_amount).sum()
        };
        let total_commission = sum_with_status(InviteCommissionStatus::Paid);
        let pending_commission = sum_with_status(InviteCommissionStatus::Pending);
        Ok(InviteStats {
            inviter_id,
            personal_invite_code: inviter.personal_invite_code,
            invite_count: inviter.invite_count,
            total_commission,
            pending_commission,
            invites,
            records,
        })
    }

    pub async fn expire_stale_invites(&self, now: DateTime<Utc>) -> Result<Vec<InviteLink>, InviteError> {
        let expired = self.db.expire_stale_invites(now).await?;
        if !expired.is_empty() {
            info!("🤝️ {} invite codes have expired", expired.len());
        }
        Ok(expired)
    }

    async fn default_invite_rate(&self) -> Result<Rate, InviteError> {
        let config = self.commission.config().await.map_err(|e| InviteError::DatabaseError(e.to_string()))?;
        Ok(config.default_invite_rate)
    }
}

/// When a code created at `now` with lifetime `ttl` expires. Lifetimes longer than [`MAX_INVITE_TTL_DAYS`] are
/// refused. A negative lifetime gives a code that has already expired.
pub fn invite_expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, InviteError> {
    if ttl > Duration::days(MAX_INVITE_TTL_DAYS) {
        return Err(InviteError::InvalidTtl(format!(
            "Invite codes can live for at most {MAX_INVITE_TTL_DAYS} days. Got {} days",
            ttl.num_days()
        )));
    }
    now.checked_add_signed(ttl).ok_or_else(|| InviteError::InvalidTtl(format!("{now} + {ttl} is out of range")))
}
