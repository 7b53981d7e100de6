use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{Money, PaymentMethod, PaymentRecord, PaymentStatus};

pub async fn insert_payment_record(
    order_id: i64,
    user_id: i64,
    method: PaymentMethod,
    amount: Money,
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<PaymentRecord, sqlx::Error> {
    let record: PaymentRecord = sqlx::query_as(
        r#"
            INSERT INTO payment_records (order_id, user_id, payment_method, amount, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(user_id)
    .bind(method)
    .bind(amount)
    .bind(status)
    .fetch_all(conn)
    .await?
    .pop()
    .ok_or(sqlx::Error::RowNotFound)?;
    debug!("💳️ Payment record #{} ({method}, {status}) created for order #{order_id}", record.id);
    Ok(record)
}

pub async fn fetch_payment_records_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    let records = sqlx::query_as("SELECT * FROM payment_records WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(records)
}

/// The most recent attempt for the order using `method` that is still `PENDING`.
pub async fn fetch_latest_pending_record(
    order_id: i64,
    method: PaymentMethod,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, sqlx::Error> {
    let record = sqlx::query_as(
        r#"
        SELECT * FROM payment_records
        WHERE order_id = $1 AND payment_method = $2 AND status = 'PENDING'
        ORDER BY id DESC LIMIT 1
        "#,
    )
    .bind(order_id)
    .bind(method)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

pub async fn update_payment_record_status(
    id: i64,
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, sqlx::Error> {
    let record = sqlx::query_as(
        "UPDATE payment_records SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(status)
    .bind(id)
    .fetch_all(conn)
    .await?
    .pop();
    Ok(record)
}

/// Marks a payment attempt as `SUCCESS` and stamps the provider reference and payment time.
pub async fn mark_record_succeeded(
    id: i64,
    third_party_order_no: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentRecord, sqlx::Error> {
    let record = sqlx::query_as(
        r#"
        UPDATE payment_records SET
            status = 'SUCCESS',
            third_party_order_no = COALESCE($1, third_party_order_no),
            paid_at = $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(third_party_order_no)
    .bind(now)
    .bind(id)
    .fetch_all(conn)
    .await?
    .pop()
    .ok_or(sqlx::Error::RowNotFound)?;
    Ok(record)
}

/// Marks the most recent `PENDING` attempt for the order using `method` as `FAILED`. Returns `None` if there was no
/// pending attempt. The lookup happens inside the update, so this is the first write of its transaction.
pub async fn mark_latest_pending_failed(
    order_id: i64,
    method: PaymentMethod,
    third_party_order_no: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, sqlx::Error> {
    let record = sqlx::query_as(
        r#"
        UPDATE payment_records SET
            status = 'FAILED',
            third_party_order_no = COALESCE($1, third_party_order_no),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = (
            SELECT id FROM payment_records
            WHERE order_id = $2 AND payment_method = $3 AND status = 'PENDING'
            ORDER BY id DESC LIMIT 1
        )
        RETURNING *
        "#,
    )
    .bind(third_party_order_no)
    .bind(order_id)
    .bind(method)
    .fetch_all(conn)
    .await?
    .pop();
    Ok(record)
}

/// Cancels every outstanding attempt for the order. Used when the buyer cancels the order itself.
pub async fn cancel_pending_records(order_id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payment_records SET status = 'CANCELLED', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND \
         status = 'PENDING'",
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
