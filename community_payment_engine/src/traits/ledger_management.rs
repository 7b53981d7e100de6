use cpg_common::Money;
use thiserror::Error;

use crate::{
    cpe_api::account_objects::{LedgerEntry, LedgerRequest, Pagination},
    db_types::{LedgerTransaction, ScoreTransaction, UserAccount},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Ledger amounts must be strictly positive. Got {0}")]
    AmountMustBePositive(Money),
    #[error("Insufficient balance in account #{user_id}. Balance is {balance}, but {required} is required")]
    InsufficientBalance { user_id: i64, balance: Money, required: Money },
    #[error("Insufficient score in account #{user_id}. Score is {score}, adjustment is {delta}")]
    InsufficientScore { user_id: i64, score: i64, delta: i64 },
    #[error("Applying {amount} to account #{user_id} would overflow its balance of {balance}")]
    BalanceOverflow { user_id: i64, balance: Money, amount: Money },
    #[error("Adjusting the score of account #{user_id} by {delta} would overflow its score of {score}")]
    ScoreOverflow { user_id: i64, score: i64, delta: i64 },
    #[error("Score adjustments cannot be zero")]
    ZeroScoreAdjustment,
    #[error("Account #{0} does not exist")]
    AccountNotFound(i64),
    #[error("The username '{0}' is already taken")]
    UsernameTaken(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref db) if db.is_check_violation() => {
                // The schema refuses negative balances as a last line of defence
                Self::DatabaseError(format!("Ledger constraint violated. {e}"))
            },
            _ => Self::DatabaseError(e.to_string()),
        }
    }
}

/// Behaviour for the per-user balance ledger and reward score.
///
/// Every balance change goes through [`debit`](Self::debit) or [`credit`](Self::credit). Implementations must hold
/// exclusive write access to the account for the duration of each call, so that the read of the current balance, the
/// balance update, and the append of the [`LedgerTransaction`] row happen as one atomic unit.
#[allow(async_fn_in_trait)]
pub trait LedgerManagement {
    /// Creates a new user with an empty balance and a fresh personal invite code. A positive `opening_balance` is
    /// written through the ledger as an `ADJUSTMENT` credit.
    async fn create_user_account(&self, username: &str, opening_balance: Money) -> Result<UserAccount, LedgerError>;

    async fn fetch_user_account(&self, user_id: i64) -> Result<Option<UserAccount>, LedgerError>;

    /// Removes `amount` from the user's balance.
    ///
    /// Fails with [`LedgerError::InsufficientBalance`] (and changes nothing) if the balance is less than `amount`.
    async fn debit(&self, request: LedgerRequest) -> Result<LedgerEntry, LedgerError>;

    /// Adds `amount` to the user's balance.
    async fn credit(&self, request: LedgerRequest) -> Result<LedgerEntry, LedgerError>;

    /// Adjusts the reward score by `delta`, which may be negative but not zero. The score may not drop below zero.
    async fn adjust_score(&self, user_id: i64, delta: i64, description: &str) -> Result<ScoreTransaction, LedgerError>;

    /// Ledger history for the user, newest first.
    async fn fetch_transactions(
        &self,
        user_id: i64,
        pagination: Pagination,
    ) -> Result<Vec<LedgerTransaction>, LedgerError>;

    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<LedgerTransaction>, LedgerError>;

    async fn fetch_score_transactions(
        &self,
        user_id: i64,
        pagination: Pagination,
    ) -> Result<Vec<ScoreTransaction>, LedgerError>;

    /// The sum of every ledger amount for the user. This always equals the balance.
    async fn ledger_sum(&self, user_id: i64) -> Result<Money, LedgerError>;
}
