//! Balance ledger and reward score for user accounts.
use std::fmt::Debug;

use log::*;

use crate::{
    cpe_api::account_objects::{LedgerAudit, LedgerEntry, LedgerRequest, Pagination},
    db_types::{LedgerTransaction, Money, ScoreTransaction, UserAccount},
    traits::{LedgerError, LedgerManagement},
};

/// `AccountApi` is the only way balances change outside of the payment and settlement flows.
pub struct AccountApi<B> {
    db: B,
}

impl<B: Debug> Debug for AccountApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountApi ({:?})", self.db)
    }
}

impl<B> AccountApi<B>
where B: LedgerManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub async fn create_account(&self, username: &str, opening_balance: Money) -> Result<UserAccount, LedgerError> {
        self.db.create_user_account(username, opening_balance).await
    }

    pub async fn account(&self, user_id: i64) -> Result<Option<UserAccount>, LedgerError> {
        self.db.fetch_user_account(user_id).await
    }

    pub async fn balance(&self, user_id: i64) -> Result<Money, LedgerError> {
        let account = self.db.fetch_user_account(user_id).await?.ok_or(LedgerError::AccountNotFound(user_id))?;
        Ok(account.balance)
    }

    pub async fn debit(&self, request: LedgerRequest) -> Result<LedgerEntry, LedgerError> {
        let user_id = request.user_id;
        let result = self.db.debit(request).await;
        if let Err(LedgerError::InsufficientBalance { balance, required, .. }) = &result {
            info!("💰️ Debit of {required} for user #{user_id} refused. Balance is {balance}");
        }
        result
    }

    pub async fn credit(&self, request: LedgerRequest) -> Result<LedgerEntry, LedgerError> {
        self.db.credit(request).await
    }

    pub async fn adjust_score(
        &self,
        user_id: i64,
        delta: i64,
        description: &str,
    ) -> Result<ScoreTransaction, LedgerError> {
        self.db.adjust_score(user_id, delta, description).await
    }

    /// Ledger history, newest first.
    pub async fn history(&self, user_id: i64, pagination: Pagination) -> Result<Vec<LedgerTransaction>, LedgerError> {
        self.db.fetch_transactions(user_id, pagination).await
    }

    pub async fn score_history(
        &self,
        user_id: i64,
        pagination: Pagination,
    ) -> Result<Vec<ScoreTransaction>, LedgerError> {
        self.db.fetch_score_transactions(user_id, pagination).await
    }

    /// Checks that the account balance equals the sum of its ledger rows.
    pub async fn audit(&self, user_id: i64) -> Result<LedgerAudit, LedgerError> {
        let balance = self.balance(user_id).await?;
        let ledger_sum = self.db.ledger_sum(user_id).await?;
        let consistent = balance == ledger_sum;
        if !consistent {
            error!("💰️ Ledger for user #{user_id} is inconsistent. Balance {balance}, ledger sum {ledger_sum}");
        }
        Ok(LedgerAudit { user_id, balance, ledger_sum, consistent })
    }
}
