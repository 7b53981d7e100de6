//! # Community payment engine public API
//!
//! The `cpe_api` module exposes the programmatic API for the payment engine. Each component is its own API struct, so
//! that clients can pick the functionality they need.
//!
//! * [`accounts_api`] is the balance ledger and reward score.
//! * [`commission_api`] holds the commission configuration and the pure split functions.
//! * [`invite_api`] manages invite codes, the inviter graph and the one-off invite commission cascade.
//! * [`order_flow_api`] owns the order state machine.
//! * [`payment_api`] is the payment gateway adapter: payment intents and provider notifications.
//! * [`settlement_api`] distributes the proceeds of a paid order.
//!
//! The `*_objects` submodules hold the request and result types used by the APIs.
//!
//! # API usage
//!
//! Every API is created from a database backend that implements the backend traits it needs:
//!
//! ```rust,ignore
//! use community_payment_engine::{AccountApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/cpg.db", 25).await?;
//! let api = AccountApi::new(db);
//! let balance = api.balance(user_id).await?;
//! ```
pub mod accounts_api;
pub mod commission_api;
pub mod invite_api;
pub mod order_flow_api;
pub mod payment_api;
pub mod settlement_api;

pub mod account_objects;
pub mod commission_objects;
pub mod invite_objects;
pub mod order_objects;
pub mod payment_objects;
pub mod settlement_objects;
