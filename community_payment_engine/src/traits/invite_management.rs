use chrono::{DateTime, Utc};
use cpg_common::Rate;
use thiserror::Error;

use crate::{
    cpe_api::{
        account_objects::LedgerEntry,
        invite_objects::{NewInviteCommission, NewInviteLink},
    },
    db_types::{InviteCommissionRecord, InviteLink},
    traits::LedgerError,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InviteError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User #{0} has already been invited by someone")]
    AlreadyLinked(i64),
    #[error("You cannot redeem your own invite code")]
    SelfInvite,
    #[error("Invite code {0} has expired")]
    CodeExpired(String),
    #[error("Invite code {0} does not exist or has already been used")]
    CodeNotFound(String),
    #[error("Invite code {0} is not in a valid format")]
    InvalidCode(String),
    #[error("Invalid invite commission rate. {0}")]
    InvalidRate(String),
    #[error("Invalid invite code lifetime. {0}")]
    InvalidTtl(String),
    #[error("Account #{0} does not exist")]
    AccountNotFound(i64),
    #[error("The invite commission for order #{0} has already been settled")]
    CommissionAlreadySettled(i64),
    #[error("Could not credit the inviter. {0}")]
    LedgerError(#[from] LedgerError),
}

impl From<sqlx::Error> for InviteError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

/// Persistence for the inviter → invitee graph and the per-order cascade payouts.
#[allow(async_fn_in_trait)]
pub trait InviteManagement {
    async fn insert_invite_link(&self, link: NewInviteLink) -> Result<InviteLink, InviteError>;

    async fn fetch_invite_by_code(&self, code: &str) -> Result<Option<InviteLink>, InviteError>;

    /// Links `invitee_id` to the owner of `code` in a single atomic transaction.
    ///
    /// Personal (permanent) codes are resolved first; redeeming one creates a `USED` invite link carrying
    /// `default_rate`. Otherwise, the code must be a `PENDING` disposable code that has not passed its expiry.
    ///
    /// Failure modes, in the order they are checked:
    /// * [`InviteError::AlreadyLinked`] if the invitee already has an inviter.
    /// * [`InviteError::CodeNotFound`] if no code matches.
    /// * [`InviteError::SelfInvite`] if the code belongs to the invitee. Nothing changes, even for an expired code.
    /// * [`InviteError::CodeNotFound`] if the code has already been used.
    /// * [`InviteError::CodeExpired`] if the code is past its expiry. The code is marked `EXPIRED`, and that change
    ///   is committed even though the call fails.
    async fn redeem_invite(
        &self,
        invitee_id: i64,
        code: &str,
        default_rate: Rate,
        now: DateTime<Utc>,
    ) -> Result<InviteLink, InviteError>;

    /// The `USED` invite link through which `invitee_id` joined, if any.
    async fn fetch_used_invite_for_invitee(&self, invitee_id: i64) -> Result<Option<InviteLink>, InviteError>;

    async fn fetch_commission_record_for_order(
        &self,
        order_id: i64,
    ) -> Result<Option<InviteCommissionRecord>, InviteError>;

    /// Stores a `PENDING` cascade payout. At most one record exists per order; if one is already present it is
    /// returned and the boolean is `false`.
    async fn insert_commission_record(
        &self,
        record: NewInviteCommission,
    ) -> Result<(InviteCommissionRecord, bool), InviteError>;

    /// Credits the inviter and marks the record `PAID`, atomically. Fails with
    /// [`InviteError::CommissionAlreadySettled`] if the record is no longer `PENDING`.
    async fn pay_commission_record(
        &self,
        record_id: i64,
    ) -> Result<(InviteCommissionRecord, LedgerEntry), InviteError>;

    /// Moves every `PENDING` link whose expiry is before `now` to `EXPIRED`, returning the links that changed.
    async fn expire_stale_invites(&self, now: DateTime<Utc>) -> Result<Vec<InviteLink>, InviteError>;

    async fn fetch_invites_for_inviter(&self, inviter_id: i64) -> Result<Vec<InviteLink>, InviteError>;

    async fn fetch_commission_records_for_inviter(
        &self,
        inviter_id: i64,
    ) -> Result<Vec<InviteCommissionRecord>, InviteError>;
}
