//! Request and response bodies for the `/api` routes.
use std::fmt::Display;

use chrono::Duration;
use community_payment_engine::{
    account_objects::Pagination,
    commission_objects::UserCommissionOverride,
    db_types::{ContentType, Money, NewOrder, OrderDetails, PaymentMethod, Rate},
    MAX_INVITE_TTL_DAYS,
};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// A new order. The buyer is always the requester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub author_id: i64,
    /// In cents
    pub amount: Money,
    pub details: OrderDetails,
}

impl NewOrderRequest {
    pub fn into_new_order(self, buyer_id: i64) -> NewOrder {
        NewOrder::new(buyer_id, self.author_id, self.amount, self.details)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PayOrderRequest {
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommissionQuoteParams {
    /// The payee. Defaults to the requester; only admins may name someone else.
    pub user_id: Option<i64>,
    pub amount: Money,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NewInviteRequest {
    /// Falls back to the configured default invite rate
    pub commission_rate: Option<Rate>,
    /// Falls back to the default code lifetime
    pub ttl_days: Option<i64>,
}

impl NewInviteRequest {
    /// A missing or non-positive `ttl_days` means the default lifetime.
    pub fn ttl(&self) -> Result<Option<Duration>, ServerError> {
        match self.ttl_days.filter(|d| *d > 0) {
            Some(days) if days > MAX_INVITE_TTL_DAYS => Err(ServerError::InvalidRequestBody(format!(
                "ttl_days must be at most {MAX_INVITE_TTL_DAYS}. Got {days}"
            ))),
            days => Ok(days.map(Duration::days)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemInviteRequest {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccountRequest {
    pub username: String,
    #[serde(default)]
    pub opening_balance: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub user_id: i64,
    pub content_type: ContentType,
    pub rate: Rate,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl From<OverrideRequest> for UserCommissionOverride {
    fn from(value: OverrideRequest) -> Self {
        Self { user_id: value.user_id, content_type: value.content_type, rate: value.rate, enabled: value.enabled }
    }
}

/// 1-based paging for list routes, e.g. `?page=2&size=20`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl From<PageParams> for Pagination {
    fn from(value: PageParams) -> Self {
        let default = Pagination::default();
        Pagination::page(value.page.unwrap_or(1), value.size.unwrap_or(default.count))
    }
}
