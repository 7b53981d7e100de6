//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or create an atomic transaction as the need arises and call through to the functions without any other changes.
//!
//! ## Writer serialisation
//! SQLite allows a single writer at a time. A transaction opened with `pool.begin()` is `DEFERRED`: it only takes the
//! write lock at its first write statement. If a transaction reads first and writes later, a concurrent writer can
//! invalidate its snapshot and the upgrade fails with `SQLITE_BUSY` without waiting. Every read-modify-write
//! transaction in this crate therefore opens with a write: either the compare-and-swap it is guarding, or
//! [`user_accounts::lock_user`]. Once that statement returns, the transaction holds the write lock and the reads that
//! follow cannot be interleaved with another writer. Waiting writers block on the busy timeout set in [`new_pool`].
//!
//! ## `RETURNING` clauses
//! A write with a `RETURNING` clause is read with `fetch_all`, never `fetch_one`/`fetch_optional`. Those stop after
//! the first row and leave the statement unfinished, which keeps the write uncommitted and the write lock held.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod commission;
pub mod invites;
pub mod ledger;
pub mod orders;
pub mod payments;
pub mod user_accounts;

const SQLITE_DB_URL: &str = "sqlite://data/community_payments.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("CPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("CPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
