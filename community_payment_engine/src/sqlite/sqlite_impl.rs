//! `SqliteDatabase` is a concrete implementation of a community payment engine backend.
//!
//! It uses SQLite as the backend and implements all the traits defined in the [`traits`](crate::traits) module.
//! Every write runs inside an explicit transaction that is committed before the call returns, so the row is visible
//! to every other pooled connection. Multi-statement operations start with a write, see [`db`](super::db) for why.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use cpg_common::Rate;
use log::*;
use sqlx::SqlitePool;

use super::db::{commission, db_url, invites, ledger, new_pool, orders, payments, user_accounts};
use crate::{
    cpe_api::{
        account_objects::{LedgerDirection, LedgerEntry, LedgerRequest, Pagination},
        commission_objects::{CommissionConfig, UserCommissionOverride},
        invite_objects::{NewInviteCommission, NewInviteLink},
        settlement_objects::{SettlementPlan, SettlementWrite},
    },
    db_types::{
        ContentType,
        InviteCommissionRecord,
        InviteKind,
        InviteLink,
        InviteStatus,
        LedgerTransaction,
        Money,
        NewOrder,
        Order,
        OrderStatusType,
        PaymentMethod,
        PaymentRecord,
        PaymentStatus,
        ScoreTransaction,
        TransactionType,
        UserAccount,
    },
    helpers::{extend_membership, new_invite_code, permanent_link_code},
    traits::{
        CommissionError,
        CommissionSettings,
        InviteError,
        InviteManagement,
        LedgerError,
        LedgerManagement,
        PaymentGatewayDatabase,
        PaymentGatewayError,
    },
};

const INVITE_CODE_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using `CPG_DATABASE_URL` (or the default) as the database location.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn apply_ledger(
        &self,
        request: LedgerRequest,
        direction: LedgerDirection,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let entry = ledger::apply_ledger_entry(&request, direction, &mut tx).await?;
        tx.commit().await?;
        Ok(entry)
    }
}

//------------------------------------------     LedgerManagement     ------------------------------------------------
impl LedgerManagement for SqliteDatabase {
    async fn create_user_account(&self, username: &str, opening_balance: Money) -> Result<UserAccount, LedgerError> {
        if opening_balance.is_negative() {
            return Err(LedgerError::AmountMustBePositive(opening_balance));
        }
        let mut tx = self.pool.begin().await?;
        let mut created = None;
        for _ in 0..INVITE_CODE_ATTEMPTS {
            let code = new_invite_code();
            if let Some(user) = user_accounts::insert_user(username, &code, &mut tx).await? {
                created = Some(user);
                break;
            }
        }
        let mut user = created
            .ok_or_else(|| LedgerError::DatabaseError(format!("Could not allocate an invite code for {username}")))?;
        if opening_balance.is_positive() {
            let request = LedgerRequest::new(user.id, opening_balance, TransactionType::Adjustment, "Opening balance");
            let entry = ledger::apply_ledger_entry(&request, LedgerDirection::Credit, &mut tx).await?;
            user.balance = entry.balance;
        }
        tx.commit().await?;
        info!("🧑️ Account #{} created for '{username}' with opening balance {opening_balance}", user.id);
        Ok(user)
    }

    async fn fetch_user_account(&self, user_id: i64) -> Result<Option<UserAccount>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let user = user_accounts::fetch_user(user_id, &mut conn).await?;
        Ok(user)
    }

    async fn debit(&self, request: LedgerRequest) -> Result<LedgerEntry, LedgerError> {
        self.apply_ledger(request, LedgerDirection::Debit).await
    }

    async fn credit(&self, request: LedgerRequest) -> Result<LedgerEntry, LedgerError> {
        self.apply_ledger(request, LedgerDirection::Credit).await
    }

    async fn adjust_score(&self, user_id: i64, delta: i64, description: &str) -> Result<ScoreTransaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = ledger::apply_score_delta(user_id, delta, description, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_transactions(
        &self,
        user_id: i64,
        pagination: Pagination,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let txs = ledger::fetch_transactions(user_id, pagination, &mut conn).await?;
        Ok(txs)
    }

    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let txs = ledger::fetch_transactions_for_order(order_id, &mut conn).await?;
        Ok(txs)
    }

    async fn fetch_score_transactions(
        &self,
        user_id: i64,
        pagination: Pagination,
    ) -> Result<Vec<ScoreTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let txs = ledger::fetch_score_transactions(user_id, pagination, &mut conn).await?;
        Ok(txs)
    }

    async fn ledger_sum(&self, user_id: i64) -> Result<Money, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let sum = ledger::ledger_sum(user_id, &mut conn).await?;
        Ok(sum)
    }
}

//------------------------------------------  PaymentGatewayDatabase  ------------------------------------------------
impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder, order_no: &str) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, order_no, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_id(id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_order_no(&self, order_no: &str) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_no(order_no, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_for_user(user_id, &mut conn).await?;
        Ok(orders)
    }

    async fn mark_order_paid(
        &self,
        order_id: i64,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let Some(order) = orders::cas_mark_paid(order_id, method, now, &mut tx).await? else {
            return Err(orders::cas_failure(order_id, OrderStatusType::Paid, &mut tx).await?);
        };
        tx.commit().await?;
        debug!("🔄️ Order [{}] is now PAID via {method}", order.order_no);
        Ok(order)
    }

    async fn cancel_order(&self, order_id: i64) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::cas_update_status(order_id, OrderStatusType::Pending, OrderStatusType::Cancelled, None, &mut tx)
                .await?;
        let Some(order) = order else {
            return Err(orders::cas_failure(order_id, OrderStatusType::Cancelled, &mut tx).await?);
        };
        let n = payments::cancel_pending_records(order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🔄️ Order [{}] cancelled. {n} outstanding payment attempts cancelled", order.order_no);
        Ok(order)
    }

    async fn refund_order(&self, order_id: i64, reason: &str) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::cas_update_status(
            order_id,
            OrderStatusType::Paid,
            OrderStatusType::Refunded,
            Some(reason),
            &mut tx,
        )
        .await?;
        let Some(order) = order else {
            return Err(orders::cas_failure(order_id, OrderStatusType::Refunded, &mut tx).await?);
        };
        tx.commit().await?;
        debug!("🔄️ Order [{}] refunded. Reason: {reason}", order.order_no);
        Ok(order)
    }

    async fn insert_payment_record(
        &self,
        order: &Order,
        method: PaymentMethod,
    ) -> Result<PaymentRecord, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let record = payments::insert_payment_record(
            order.id,
            order.user_id,
            method,
            order.amount,
            PaymentStatus::Pending,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn update_payment_record_status(
        &self,
        record_id: i64,
        status: PaymentStatus,
    ) -> Result<PaymentRecord, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let record = payments::update_payment_record_status(record_id, status, &mut tx)
            .await?
            .ok_or(PaymentGatewayError::PaymentRecordNotFound(record_id))?;
        tx.commit().await?;
        Ok(record)
    }

    async fn fetch_payment_records_for_order(&self, order_id: i64) -> Result<Vec<PaymentRecord>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let records = payments::fetch_payment_records_for_order(order_id, &mut conn).await?;
        Ok(records)
    }

    async fn mark_payment_succeeded(
        &self,
        order_no: &str,
        method: PaymentMethod,
        third_party_order_no: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Order, PaymentRecord), PaymentGatewayError> {
        // The order id never changes, so it can be resolved before the transaction starts
        let order_id = self
            .fetch_order_by_order_no(order_no)
            .await?
            .map(|o| o.id)
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.to_string()))?;
        let mut tx = self.pool.begin().await?;
        let Some(order) = orders::cas_mark_paid(order_id, method, now, &mut tx).await? else {
            return Err(orders::cas_failure(order_id, OrderStatusType::Paid, &mut tx).await?);
        };
        let pending = payments::fetch_latest_pending_record(order.id, method, &mut tx).await?;
        let record_id = match pending {
            Some(record) => record.id,
            None => {
                warn!("🔄️ No pending {method} payment attempt for order [{order_no}]. Recording one now.");
                let record = payments::insert_payment_record(
                    order.id,
                    order.user_id,
                    method,
                    order.amount,
                    PaymentStatus::Pending,
                    &mut tx,
                )
                .await?;
                record.id
            },
        };
        let record = payments::mark_record_succeeded(record_id, third_party_order_no, now, &mut tx).await?;
        tx.commit().await?;
        info!("🔄️ Order [{order_no}] paid via {method}. Payment record #{} marked SUCCESS", record.id);
        Ok((order, record))
    }

    async fn mark_payment_failed(
        &self,
        order_no: &str,
        method: PaymentMethod,
        third_party_order_no: Option<&str>,
    ) -> Result<Option<PaymentRecord>, PaymentGatewayError> {
        let order = self
            .fetch_order_by_order_no(order_no)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.to_string()))?;
        let mut tx = self.pool.begin().await?;
        let record = payments::mark_latest_pending_failed(order.id, method, third_party_order_no, &mut tx).await?;
        tx.commit().await?;
        match &record {
            Some(r) => info!("🔄️ Payment record #{} for order [{order_no}] marked FAILED", r.id),
            None => debug!("🔄️ No pending {method} payment attempt for order [{order_no}] to mark as failed"),
        }
        Ok(record)
    }

    async fn pay_with_balance(
        &self,
        order_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(Order, PaymentRecord, LedgerEntry), PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let Some(order) = orders::cas_mark_paid(order_id, PaymentMethod::Balance, now, &mut tx).await? else {
            return Err(orders::cas_failure(order_id, OrderStatusType::Paid, &mut tx).await?);
        };
        let record = payments::insert_payment_record(
            order.id,
            order.user_id,
            PaymentMethod::Balance,
            order.amount,
            PaymentStatus::Pending,
            &mut tx,
        )
        .await?;
        let record = payments::mark_record_succeeded(record.id, None, now, &mut tx).await?;
        let request = LedgerRequest::new(
            order.user_id,
            order.amount,
            TransactionType::Payment,
            format!("Payment for order {}", order.order_no),
        )
        .with_order(order.id)
        .with_payment(record.id);
        // An insufficient balance aborts here, and dropping `tx` rolls the order back to PENDING
        let entry = ledger::apply_ledger_entry(&request, LedgerDirection::Debit, &mut tx).await?;
        tx.commit().await?;
        info!("🔄️ Order [{}] paid from balance. Buyer balance is now {}", order.order_no, entry.balance);
        Ok((order, record, entry))
    }

    async fn apply_settlement(&self, plan: SettlementPlan) -> Result<SettlementWrite, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        if !orders::claim_settlement(plan.order_id, plan.now, &mut tx).await? {
            return Err(PaymentGatewayError::AlreadySettled(plan.order_id));
        }
        let author_entry = match &plan.author_credit {
            Some(request) => Some(ledger::apply_ledger_entry(request, LedgerDirection::Credit, &mut tx).await?),
            None => None,
        };
        let membership = match plan.membership {
            Some(purchase) => {
                let user_id = purchase.user_id;
                if !user_accounts::lock_user(user_id, &mut tx).await? {
                    return Err(LedgerError::AccountNotFound(user_id).into());
                }
                let user =
                    user_accounts::fetch_user(user_id, &mut tx).await?.ok_or(LedgerError::AccountNotFound(user_id))?;
                let updated = extend_membership(&user.membership(), &purchase, plan.now);
                user_accounts::update_membership(user_id, &updated, &mut tx).await?;
                debug!("🔄️ Membership for user #{user_id} is now level {} until {:?}", updated.level, updated.end_date);
                Some(updated)
            },
            None => None,
        };
        tx.commit().await?;
        Ok(SettlementWrite { author_entry, membership })
    }
}

//------------------------------------------    InviteManagement     -------------------------------------------------
impl InviteManagement for SqliteDatabase {
    async fn insert_invite_link(&self, link: NewInviteLink) -> Result<InviteLink, InviteError> {
        let mut tx = self.pool.begin().await?;
        let link = invites::insert_invite_link(link, &mut tx).await?;
        tx.commit().await?;
        Ok(link)
    }

    async fn fetch_invite_by_code(&self, code: &str) -> Result<Option<InviteLink>, InviteError> {
        let mut conn = self.pool.acquire().await?;
        let link = invites::fetch_invite_by_code(code, &mut conn).await?;
        Ok(link)
    }

    async fn redeem_invite(
        &self,
        invitee_id: i64,
        code: &str,
        default_rate: Rate,
        now: DateTime<Utc>,
    ) -> Result<InviteLink, InviteError> {
        let mut tx = self.pool.begin().await?;
        if !user_accounts::lock_user(invitee_id, &mut tx).await? {
            return Err(InviteError::AccountNotFound(invitee_id));
        }
        let invitee =
            user_accounts::fetch_user(invitee_id, &mut tx).await?.ok_or(InviteError::AccountNotFound(invitee_id))?;
        if invitee.inviter_id.is_some() {
            return Err(InviteError::AlreadyLinked(invitee_id));
        }
        // Personal codes first
        let link = if let Some(owner) = user_accounts::fetch_user_by_invite_code(code, &mut tx).await? {
            if owner.id == invitee_id {
                return Err(InviteError::SelfInvite);
            }
            let new_link = NewInviteLink {
                inviter_id: owner.id,
                code: permanent_link_code(code, invitee_id),
                kind: InviteKind::Permanent,
                commission_rate: default_rate,
                expires_at: None,
            };
            invites::insert_used_link(new_link, invitee_id, now, &mut tx).await?
        } else {
            let link = invites::fetch_invite_by_code(code, &mut tx)
                .await?
                .filter(|l| l.kind == InviteKind::Disposable)
                .ok_or_else(|| InviteError::CodeNotFound(code.to_string()))?;
            if link.inviter_id == invitee_id {
                return Err(InviteError::SelfInvite);
            }
            match link.status {
                InviteStatus::Used => return Err(InviteError::CodeNotFound(code.to_string())),
                InviteStatus::Expired => return Err(InviteError::CodeExpired(code.to_string())),
                InviteStatus::Pending => {},
            }
            if link.is_past_expiry(now) {
                invites::mark_invite_expired(link.id, &mut tx).await?;
                tx.commit().await?;
                info!("🤝️ Invite code {code} was redeemed after it expired. It is now marked EXPIRED");
                return Err(InviteError::CodeExpired(code.to_string()));
            }
            invites::cas_mark_used(link.id, invitee_id, now, &mut tx)
                .await?
                .ok_or_else(|| InviteError::CodeNotFound(code.to_string()))?
        };
        if !user_accounts::link_inviter(invitee_id, link.inviter_id, code, &mut tx).await? {
            return Err(InviteError::AlreadyLinked(invitee_id));
        }
        user_accounts::incr_invite_count(link.inviter_id, &mut tx).await?;
        tx.commit().await?;
        info!("🤝️ User #{invitee_id} joined via user #{}'s invite code {code}", link.inviter_id);
        Ok(link)
    }

    async fn fetch_used_invite_for_invitee(&self, invitee_id: i64) -> Result<Option<InviteLink>, InviteError> {
        let mut conn = self.pool.acquire().await?;
        let link = invites::fetch_used_invite_for_invitee(invitee_id, &mut conn).await?;
        Ok(link)
    }

    async fn fetch_commission_record_for_order(
        &self,
        order_id: i64,
    ) -> Result<Option<InviteCommissionRecord>, InviteError> {
        let mut conn = self.pool.acquire().await?;
        let record = invites::fetch_commission_record_for_order(order_id, &mut conn).await?;
        Ok(record)
    }

    async fn insert_commission_record(
        &self,
        record: NewInviteCommission,
    ) -> Result<(InviteCommissionRecord, bool), InviteError> {
        let mut tx = self.pool.begin().await?;
        let order_id = record.order_id;
        if let Some(inserted) = invites::insert_commission_record(record, &mut tx).await? {
            tx.commit().await?;
            return Ok((inserted, true));
        }
        let existing = invites::fetch_commission_record_for_order(order_id, &mut tx)
            .await?
            .ok_or_else(|| InviteError::DatabaseError(format!("Commission record for order #{order_id} vanished")))?;
        tx.commit().await?;
        Ok((existing, false))
    }

    async fn pay_commission_record(
        &self,
        record_id: i64,
    ) -> Result<(InviteCommissionRecord, LedgerEntry), InviteError> {
        let mut tx = self.pool.begin().await?;
        let Some(record) = invites::cas_mark_commission_paid(record_id, &mut tx).await? else {
            let existing = invites::fetch_commission_record(record_id, &mut tx).await?;
            let order_id = existing.map(|r| r.order_id).unwrap_or_default();
            return Err(InviteError::CommissionAlreadySettled(order_id));
        };
        let request = LedgerRequest::new(
            record.inviter_id,
            record.commission_amount,
            TransactionType::Commission,
            format!("Invite commission for order #{}", record.order_id),
        )
        .with_order(record.order_id);
        let entry = ledger::apply_ledger_entry(&request, LedgerDirection::Credit, &mut tx).await?;
        tx.commit().await?;
        Ok((record, entry))
    }

    async fn expire_stale_invites(&self, now: DateTime<Utc>) -> Result<Vec<InviteLink>, InviteError> {
        let mut tx = self.pool.begin().await?;
        let links = invites::expire_stale_invites(now, &mut tx).await?;
        tx.commit().await?;
        Ok(links)
    }

    async fn fetch_invites_for_inviter(&self, inviter_id: i64) -> Result<Vec<InviteLink>, InviteError> {
        let mut conn = self.pool.acquire().await?;
        let links = invites::fetch_invites_for_inviter(inviter_id, &mut conn).await?;
        Ok(links)
    }

    async fn fetch_commission_records_for_inviter(
        &self,
        inviter_id: i64,
    ) -> Result<Vec<InviteCommissionRecord>, InviteError> {
        let mut conn = self.pool.acquire().await?;
        let records = invites::fetch_commission_records_for_inviter(inviter_id, &mut conn).await?;
        Ok(records)
    }
}

//------------------------------------------   CommissionSettings    -------------------------------------------------
impl CommissionSettings for SqliteDatabase {
    async fn fetch_commission_config(&self) -> Result<CommissionConfig, CommissionError> {
        let mut conn = self.pool.acquire().await?;
        commission::fetch_commission_config(&mut conn).await
    }

    async fn update_commission_config(&self, config: &CommissionConfig) -> Result<(), CommissionError> {
        let mut tx = self.pool.begin().await?;
        commission::update_commission_config(config, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_user_override(
        &self,
        user_id: i64,
        content_type: ContentType,
    ) -> Result<Option<UserCommissionOverride>, CommissionError> {
        let mut conn = self.pool.acquire().await?;
        let value = commission::fetch_user_override(user_id, content_type, &mut conn).await?;
        Ok(value)
    }

    async fn upsert_user_override(&self, value: &UserCommissionOverride) -> Result<(), CommissionError> {
        let mut tx = self.pool.begin().await?;
        commission::upsert_user_override(value, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
