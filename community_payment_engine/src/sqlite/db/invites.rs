use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    cpe_api::invite_objects::{NewInviteCommission, NewInviteLink},
    db_types::{InviteCommissionRecord, InviteLink},
};

pub async fn insert_invite_link(link: NewInviteLink, conn: &mut SqliteConnection) -> Result<InviteLink, sqlx::Error> {
    let link: InviteLink = sqlx::query_as(
        r#"
            INSERT INTO invite_links (inviter_id, code, kind, commission_rate, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(link.inviter_id)
    .bind(link.code)
    .bind(link.kind)
    .bind(link.commission_rate)
    .bind(link.expires_at)
    .fetch_all(conn)
    .await?
    .pop()
    .ok_or(sqlx::Error::RowNotFound)?;
    debug!("🤝️ Invite link {} ({}) created for user #{}", link.code, link.kind, link.inviter_id);
    Ok(link)
}

pub async fn fetch_invite_by_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<InviteLink>, sqlx::Error> {
    let link = sqlx::query_as("SELECT * FROM invite_links WHERE code = $1").bind(code).fetch_optional(conn).await?;
    Ok(link)
}

/// Marks a `PENDING` link as `EXPIRED`. Returns `false` if the link was no longer pending.
pub async fn mark_invite_expired(id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE invite_links SET status = 'EXPIRED', updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND status = \
         'PENDING'",
    )
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// The PENDING → USED compare-and-swap for a disposable link.
pub async fn cas_mark_used(
    id: i64,
    invitee_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<InviteLink>, sqlx::Error> {
    let link = sqlx::query_as(
        r#"
        UPDATE invite_links SET status = 'USED', invitee_id = $1, used_at = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 AND status = 'PENDING'
        RETURNING *
        "#,
    )
    .bind(invitee_id)
    .bind(now)
    .bind(id)
    .fetch_all(conn)
    .await?
    .pop();
    Ok(link)
}

/// Records a redeemed personal code as an already-used link.
pub async fn insert_used_link(
    link: NewInviteLink,
    invitee_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<InviteLink, sqlx::Error> {
    let link = sqlx::query_as(
        r#"
            INSERT INTO invite_links (inviter_id, invitee_id, code, kind, status, commission_rate, used_at)
            VALUES ($1, $2, $3, $4, 'USED', $5, $6)
            RETURNING *;
        "#,
    )
    .bind(link.inviter_id)
    .bind(invitee_id)
    .bind(link.code)
    .bind(link.kind)
    .bind(link.commission_rate)
    .bind(now)
    .fetch_all(conn)
    .await?
    .pop()
    .ok_or(sqlx::Error::RowNotFound)?;
    Ok(link)
}

pub async fn fetch_used_invite_for_invitee(
    invitee_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<InviteLink>, sqlx::Error> {
    let link = sqlx::query_as(
        "SELECT * FROM invite_links WHERE invitee_id = $1 AND status = 'USED' ORDER BY used_at DESC, id DESC LIMIT 1",
    )
    .bind(invitee_id)
    .fetch_optional(conn)
    .await?;
    Ok(link)
}

/// Moves every `PENDING` link that expired before `now` to `EXPIRED`.
pub async fn expire_stale_invites(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<InviteLink>, sqlx::Error> {
    let links: Vec<InviteLink> = sqlx::query_as(
        r#"
        UPDATE invite_links SET status = 'EXPIRED', updated_at = CURRENT_TIMESTAMP
        WHERE status = 'PENDING' AND expires_at IS NOT NULL AND expires_at < $1
        RETURNING *
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    trace!("🤝️ {} stale invite links expired", links.len());
    Ok(links)
}

pub async fn fetch_invites_for_inviter(
    inviter_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<InviteLink>, sqlx::Error> {
    let links = sqlx::query_as("SELECT * FROM invite_links WHERE inviter_id = $1 ORDER BY id DESC")
        .bind(inviter_id)
        .fetch_all(conn)
        .await?;
    Ok(links)
}

//------------------------------------------   Commission records   --------------------------------------------------

/// Inserts a `PENDING` cascade payout unless the order already has one. Returns `None` if a record already existed.
pub async fn insert_commission_record(
    record: NewInviteCommission,
    conn: &mut SqliteConnection,
) -> Result<Option<InviteCommissionRecord>, sqlx::Error> {
    let record = sqlx::query_as(
        r#"
            INSERT INTO invite_commission_records (
                invite_id,
                inviter_id,
                invitee_id,
                order_id,
                order_amount,
                commission_rate,
                commission_amount
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(record.invite_id)
    .bind(record.inviter_id)
    .bind(record.invitee_id)
    .bind(record.order_id)
    .bind(record.order_amount)
    .bind(record.commission_rate)
    .bind(record.commission_amount)
    .fetch_all(conn)
    .await?
    .pop();
    Ok(record)
}

pub async fn fetch_commission_record(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<InviteCommissionRecord>, sqlx::Error> {
    let record = sqlx::query_as("SELECT * FROM invite_commission_records WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

pub async fn fetch_commission_record_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<InviteCommissionRecord>, sqlx::Error> {
    let record = sqlx::query_as("SELECT * FROM invite_commission_records WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

/// The PENDING → PAID compare-and-swap for a cascade payout.
pub async fn cas_mark_commission_paid(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<InviteCommissionRecord>, sqlx::Error> {
    let record = sqlx::query_as(
        r#"
        UPDATE invite_commission_records SET status = 'PAID', updated_at = CURRENT_TIMESTAMP
        WHERE id = $1 AND status = 'PENDING'
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_all(conn)
    .await?
    .pop();
    Ok(record)
}

pub async fn fetch_commission_records_for_inviter(
    inviter_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<InviteCommissionRecord>, sqlx::Error> {
    let records = sqlx::query_as("SELECT * FROM invite_commission_records WHERE inviter_id = $1 ORDER BY id DESC")
        .bind(inviter_id)
        .fetch_all(conn)
        .await?;
    Ok(records)
}
