use log::{debug, trace};
use sqlx::SqliteConnection;

use super::user_accounts;
use crate::{
    cpe_api::account_objects::{LedgerDirection, LedgerEntry, LedgerRequest, Pagination},
    db_types::{LedgerTransaction, Money, ScoreTransaction},
    traits::LedgerError,
};

/// Debits or credits a user's balance and appends the matching transaction row.
///
/// This is not atomic by itself. Run it inside a transaction (pass `&mut *tx`) so that the balance update and the
/// transaction row commit or roll back together. The account row is touched first so that the transaction holds the
/// write lock before the balance is read.
pub async fn apply_ledger_entry(
    request: &LedgerRequest,
    direction: LedgerDirection,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, LedgerError> {
    let LedgerRequest { user_id, amount, .. } = *request;
    if !amount.is_positive() {
        return Err(LedgerError::AmountMustBePositive(amount));
    }
    if !user_accounts::lock_user(user_id, &mut *conn).await? {
        return Err(LedgerError::AccountNotFound(user_id));
    }
    let balance_before =
        user_accounts::fetch_balance(user_id, &mut *conn).await?.ok_or(LedgerError::AccountNotFound(user_id))?;
    let signed_amount = match direction {
        LedgerDirection::Debit => {
            if balance_before < amount {
                return Err(LedgerError::InsufficientBalance { user_id, balance: balance_before, required: amount });
            }
            -amount
        },
        LedgerDirection::Credit => amount,
    };
    let balance_after = balance_before.checked_add(signed_amount).ok_or(LedgerError::BalanceOverflow {
        user_id,
        balance: balance_before,
        amount: signed_amount,
    })?;
    // Second check, on the value we are about to persist
    if balance_after.is_negative() {
        return Err(LedgerError::InsufficientBalance { user_id, balance: balance_before, required: amount });
    }
    user_accounts::update_balance(user_id, balance_after, &mut *conn).await?;
    let transaction = insert_ledger_transaction(request, signed_amount, balance_before, balance_after, conn).await?;
    debug!(
        "💰️ {:?} of {amount} for user #{user_id} ({}). Balance {balance_before} -> {balance_after}",
        direction, request.tx_type
    );
    Ok(LedgerEntry { balance: balance_after, transaction })
}

async fn insert_ledger_transaction(
    request: &LedgerRequest,
    signed_amount: Money,
    balance_before: Money,
    balance_after: Money,
    conn: &mut SqliteConnection,
) -> Result<LedgerTransaction, sqlx::Error> {
    let tx = sqlx::query_as(
        r#"
            INSERT INTO ledger_transactions (
                user_id,
                tx_type,
                amount,
                balance_before,
                balance_after,
                order_id,
                payment_id,
                description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(request.user_id)
    .bind(request.tx_type)
    .bind(signed_amount)
    .bind(balance_before)
    .bind(balance_after)
    .bind(request.order_id)
    .bind(request.payment_id)
    .bind(&request.description)
    .fetch_all(conn)
    .await?
    .pop()
    .ok_or(sqlx::Error::RowNotFound)?;
    Ok(tx)
}

/// Adds `delta` to the user's score and records a score transaction. Same locking rules as [`apply_ledger_entry`].
pub async fn apply_score_delta(
    user_id: i64,
    delta: i64,
    description: &str,
    conn: &mut SqliteConnection,
) -> Result<ScoreTransaction, LedgerError> {
    if delta == 0 {
        return Err(LedgerError::ZeroScoreAdjustment);
    }
    if !user_accounts::lock_user(user_id, &mut *conn).await? {
        return Err(LedgerError::AccountNotFound(user_id));
    }
    let score_before =
        user_accounts::fetch_score(user_id, &mut *conn).await?.ok_or(LedgerError::AccountNotFound(user_id))?;
    let score_after =
        score_before.checked_add(delta).ok_or(LedgerError::ScoreOverflow { user_id, score: score_before, delta })?;
    if score_after < 0 {
        return Err(LedgerError::InsufficientScore { user_id, score: score_before, delta });
    }
    user_accounts::update_score(user_id, score_after, &mut *conn).await?;
    let tx = sqlx::query_as(
        r#"
            INSERT INTO score_transactions (user_id, delta, score_before, score_after, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(delta)
    .bind(score_before)
    .bind(score_after)
    .bind(description)
    .fetch_all(conn)
    .await?
    .pop()
    .ok_or(sqlx::Error::RowNotFound)?;
    trace!("💰️ Score for user #{user_id} {score_before} -> {score_after}");
    Ok(tx)
}

pub async fn fetch_transactions(
    user_id: i64,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerTransaction>, sqlx::Error> {
    let txs = sqlx::query_as("SELECT * FROM ledger_transactions WHERE user_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3")
        .bind(user_id)
        .bind(pagination.count)
        .bind(pagination.offset)
        .fetch_all(conn)
        .await?;
    Ok(txs)
}

pub async fn fetch_transactions_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerTransaction>, sqlx::Error> {
    let txs = sqlx::query_as("SELECT * FROM ledger_transactions WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(txs)
}

pub async fn fetch_score_transactions(
    user_id: i64,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<ScoreTransaction>, sqlx::Error> {
    let txs = sqlx::query_as("SELECT * FROM score_transactions WHERE user_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3")
        .bind(user_id)
        .bind(pagination.count)
        .bind(pagination.offset)
        .fetch_all(conn)
        .await?;
    Ok(txs)
}

pub async fn ledger_sum(user_id: i64, conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let sum: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM ledger_transactions WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(conn)
        .await?;
    Ok(Money::from(sum))
}
