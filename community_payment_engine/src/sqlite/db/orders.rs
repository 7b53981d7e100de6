use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderStatusType, PaymentMethod},
    traits::PaymentGatewayError,
};

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
pub async fn insert_order(
    order: NewOrder,
    order_no: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentGatewayError> {
    let order_type = order.order_type();
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_no,
                user_id,
                author_id,
                order_type,
                amount,
                details
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order_no)
    .bind(order.user_id)
    .bind(order.author_id)
    .bind(order_type)
    .bind(order.amount)
    .bind(Json(&order.details))
    .fetch_all(conn)
    .await?
    .pop()
    .ok_or(sqlx::Error::RowNotFound)?;
    debug!("📝️ Order [{}] inserted with id {}", order.order_no, order.id);
    Ok(order)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_order_no(
    order_no: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_no = $1").bind(order_no).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_orders_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 ORDER BY id DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    trace!("📝️ {} orders fetched for user #{user_id}", orders.len());
    Ok(orders)
}

/// The PENDING → PAID compare-and-swap. Returns `None` if the order does not exist or was not `PENDING`.
pub async fn cas_mark_paid(
    id: i64,
    method: PaymentMethod,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET status = 'PAID', payment_method = $1, paid_at = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 AND status = 'PENDING'
        RETURNING *
        "#,
    )
    .bind(method)
    .bind(now)
    .bind(id)
    .fetch_all(conn)
    .await?
    .pop();
    Ok(order)
}

/// Moves the order from `from` to `to` if, and only if, it currently has status `from`.
pub async fn cas_update_status(
    id: i64,
    from: OrderStatusType,
    to: OrderStatusType,
    refund_reason: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET status = $1, refund_reason = COALESCE($2, refund_reason), updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 AND status = $4
        RETURNING *
        "#,
    )
    .bind(to)
    .bind(refund_reason)
    .bind(id)
    .bind(from)
    .fetch_all(conn)
    .await?
    .pop();
    Ok(order)
}

/// Stamps `settled_at` on a paid order. Returns `false` if the order was already settled (or is not `PAID`).
pub async fn claim_settlement(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders SET settled_at = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND status = 'PAID' AND \
         settled_at IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Explains why a compare-and-swap on an order found nothing to update. Any failed attempt to mark an order as paid
/// is reported as [`PaymentGatewayError::AlreadyPaid`], whatever the order's current status.
pub async fn cas_failure(
    id: i64,
    to: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<PaymentGatewayError, sqlx::Error> {
    let err = match fetch_order_by_id(id, conn).await? {
        None => PaymentGatewayError::OrderNotFound(format!("#{id}")),
        Some(order) if to == OrderStatusType::Paid => PaymentGatewayError::AlreadyPaid(order.order_no),
        Some(order) => {
            PaymentGatewayError::OrderModificationForbidden { order_no: order.order_no, from: order.status, to }
        },
    };
    Ok(err)
}
