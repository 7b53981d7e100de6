use std::ops::Deref;

use serde::Serialize;

use crate::db_types::{Order, OrderStatusType};

/// An order whose PENDING → PAID transition was performed by the caller holding this value.
///
/// `PaidOrder` can only be created inside the engine, from the result of a successful compare-and-swap on the order
/// status. Settlement takes a `PaidOrder`, so a payment notification that loses the race (or is a redelivery) has no
/// way of settling the same order a second time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaidOrder(Order);

impl PaidOrder {
    pub(crate) fn new(order: Order) -> Self {
        debug_assert_eq!(order.status, OrderStatusType::Paid);
        Self(order)
    }

    pub fn order(&self) -> &Order {
        &self.0
    }

    pub fn into_inner(self) -> Order {
        self.0
    }
}

impl Deref for PaidOrder {
    type Target = Order;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Who is asking to change an order. Identity is asserted by the caller (e.g. an authentication gateway).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: i64,
    pub is_admin: bool,
}

impl Requester {
    pub fn user(user_id: i64) -> Self {
        Self { user_id, is_admin: false }
    }

    pub fn admin(user_id: i64) -> Self {
        Self { user_id, is_admin: true }
    }

    pub fn can_view(&self, order: &Order) -> bool {
        self.is_admin || order.user_id == self.user_id || order.author_id == self.user_id
    }
}
