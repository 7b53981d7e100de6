//! # Database backend contracts.
//!
//! This module provides the interfaces that define the interface contracts of the payment engine database *backends*.
//!
//! ## Accounts
//! Every user carries a spendable balance and a reward score. Both are only ever changed through the ledger, which
//! appends an immutable transaction row for each change. The [`LedgerManagement`] trait covers this.
//!
//! ## Traits
//! The module defines behavior that database backends need to expose in order to be supported by the engine.
//!
//! * [`PaymentGatewayDatabase`] defines the highest level of behavior: orders, payment attempts and settlement writes.
//! * [`LedgerManagement`] defines the balance ledger and score counter.
//! * [`InviteManagement`] defines the invite graph and cascade payouts.
//! * [`CommissionSettings`] defines storage for commission rates.
mod commission_settings;
mod invite_management;
mod ledger_management;
mod payment_gateway_database;

pub use commission_settings::{CommissionError, CommissionSettings};
pub use invite_management::{InviteError, InviteManagement};
pub use ledger_management::{LedgerError, LedgerManagement};
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
