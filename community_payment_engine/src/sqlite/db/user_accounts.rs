use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Membership, Money, UserAccount},
    traits::LedgerError,
};

/// Inserts a new user with a zero balance. Fails with [`LedgerError::UsernameTaken`] if the name exists.
///
/// Returns `None` if `personal_invite_code` collides with an existing code, so that the caller can retry with a new
/// one.
pub async fn insert_user(
    username: &str,
    personal_invite_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<UserAccount>, LedgerError> {
    let result: Result<UserAccount, sqlx::Error> =
        sqlx::query_as("INSERT INTO users (username, personal_invite_code) VALUES ($1, $2) RETURNING *")
            .bind(username)
            .bind(personal_invite_code)
            .fetch_all(conn)
            .await
            .and_then(|rows| rows.into_iter().next().ok_or(sqlx::Error::RowNotFound));
    match result {
        Ok(user) => {
            debug!("🧑️ User '{username}' created");
            Ok(Some(user))
        },
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            if db.message().contains("username") {
                Err(LedgerError::UsernameTaken(username.to_string()))
            } else {
                trace!("🧑️ Invite code {personal_invite_code} is already in use");
                Ok(None)
            }
        },
        Err(e) => Err(LedgerError::from(e)),
    }
}

pub async fn fetch_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<UserAccount>, sqlx::Error> {
    let user = sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(user)
}

pub async fn fetch_user_by_invite_code(
    code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<UserAccount>, sqlx::Error> {
    let user = sqlx::query_as("SELECT * FROM users WHERE personal_invite_code = $1")
        .bind(code)
        .fetch_optional(conn)
        .await?;
    Ok(user)
}

/// Takes the database write lock by touching the user row. Returns `false` if the user does not exist.
///
/// Call this as the first statement of a transaction that reads and then modifies the account.
pub async fn lock_user(user_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE users SET updated_at = updated_at WHERE id = $1").bind(user_id).execute(conn).await?;
    trace!("🧑️ Write lock taken for user #{user_id}");
    Ok(result.rows_affected() == 1)
}

pub async fn fetch_balance(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<Money>, sqlx::Error> {
    let balance =
        sqlx::query_scalar("SELECT balance FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(balance)
}

pub async fn fetch_score(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<i64>, sqlx::Error> {
    let score = sqlx::query_scalar("SELECT score FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(score)
}

pub async fn update_balance(user_id: i64, balance: Money, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET balance = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(balance)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_score(user_id: i64, score: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET score = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(score)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_membership(
    user_id: i64,
    membership: &Membership,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users SET
            membership_level = $1,
            membership_status = $2,
            membership_start_date = $3,
            membership_end_date = $4,
            membership_lifetime = $5,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $6
        "#,
    )
    .bind(membership.level)
    .bind(membership.status)
    .bind(membership.start_date)
    .bind(membership.end_date)
    .bind(membership.lifetime)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Sets the invitee's inviter, but only if they do not have one yet. Returns `false` if the invitee was already
/// linked.
pub async fn link_inviter(
    invitee_id: i64,
    inviter_id: i64,
    code: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE users SET inviter_id = $1, invited_with_code = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 AND inviter_id IS NULL
        "#,
    )
    .bind(inviter_id)
    .bind(code)
    .bind(invitee_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn incr_invite_count(inviter_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET invite_count = invite_count + 1, updated_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(inviter_id)
        .execute(conn)
        .await?;
    Ok(())
}
