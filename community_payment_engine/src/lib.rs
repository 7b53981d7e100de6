//! Community Payment Engine
//!
//! The money-movement core of a content community: every user has a spendable balance and a reward score kept in an
//! append-only ledger, content sales pay the author and the platform, invited users earn their inviter a one-off
//! commission, and orders are paid either from the balance or through a third-party payment provider.
//!
//! The library is divided into these sections:
//! 1. Backend contracts ([`mod@traits`]) and the SQLite backend ([`SqliteDatabase`]). You should not need to access
//!    the database directly. The exception is the data types in [`mod@db_types`], which are public.
//! 2. The public API ([`mod@cpe_api`]): one API struct per component, each generic over the backend.
//! 3. Payment provider adapters ([`mod@providers`]) that the payment gateway uses to talk to Alipay, WeChat Pay and
//!    Epay.
//!
//! The engine also publishes events when an order is paid and when a balance changes. See [`mod@events`] for how to
//! hook into them.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod providers;
pub mod traits;

mod cpe_api;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::{db as sqlite_db, SqliteDatabase};
pub use cpe_api::{
    account_objects,
    accounts_api::AccountApi,
    commission_api::{content_split, order_split, CommissionApi},
    commission_objects,
    invite_api::{invite_expiry, InviteApi, DEFAULT_INVITE_TTL_DAYS, MAX_INVITE_TTL_DAYS},
    invite_objects,
    order_flow_api::OrderFlowApi,
    order_objects,
    payment_api::PaymentApi,
    payment_objects,
    settlement_api::SettlementApi,
    settlement_objects,
};
pub use traits::{
    CommissionError,
    CommissionSettings,
    InviteError,
    InviteManagement,
    LedgerError,
    LedgerManagement,
    PaymentGatewayDatabase,
    PaymentGatewayError,
};
