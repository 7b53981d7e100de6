//! Data types that are persisted by the engine backends.
//!
//! Enumerations are stored as upper-case TEXT (e.g. `'PENDING'`), amounts as integer cents via [`Money`], and rates as
//! integer parts-per-million via [`Rate`].
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use cpg_common::{Money, Rate};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

/// Implements `Display` and a case-insensitive `FromStr` for a fieldless enum, using the upper-case persisted names.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($text),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ConversionError { kind: $kind, value: s.to_string() }),
                }
            }
        }
    };
}

//--------------------------------------   TransactionType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// The user paid for an order from their balance
    Payment,
    Refund,
    /// Funds were added from outside the system
    Recharge,
    /// Author earnings and invite cascade payouts
    Commission,
    Withdraw,
    /// Manual corrections and opening balances
    Adjustment,
}

text_enum!(TransactionType, "transaction type", {
    Payment => "PAYMENT",
    Refund => "REFUND",
    Recharge => "RECHARGE",
    Commission => "COMMISSION",
    Withdraw => "WITHDRAW",
    Adjustment => "ADJUSTMENT",
});

//--------------------------------------   OrderStatusType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The order has been created and is awaiting payment.
    Pending,
    /// Payment has been received. This is the only status from which settlement happens.
    Paid,
    /// The buyer cancelled the order before paying.
    Cancelled,
    /// The seller or an administrator refunded a paid order.
    Refunded,
}

text_enum!(OrderStatusType, "order status", {
    Pending => "PENDING",
    Paid => "PAID",
    Cancelled => "CANCELLED",
    Refunded => "REFUNDED",
});

//--------------------------------------      OrderType       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Membership,
    Product,
    Service,
    Article,
}

/// Commission rates are configured per content type, which is the same closed set as the order types.
pub type ContentType = OrderType;

text_enum!(OrderType, "order type", {
    Membership => "MEMBERSHIP",
    Product => "PRODUCT",
    Service => "SERVICE",
    Article => "ARTICLE",
});

impl OrderType {
    pub const ALL: [OrderType; 4] = [OrderType::Article, OrderType::Membership, OrderType::Product, OrderType::Service];
}

//--------------------------------------    PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Alipay,
    Wechat,
    /// Paid from the buyer's ledger balance
    Balance,
    Epay,
}

text_enum!(PaymentMethod, "payment method", {
    Alipay => "ALIPAY",
    Wechat => "WECHAT",
    Balance => "BALANCE",
    Epay => "EPAY",
});

impl PaymentMethod {
    pub fn is_third_party(&self) -> bool {
        !matches!(self, PaymentMethod::Balance)
    }
}

//--------------------------------------    PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

text_enum!(PaymentStatus, "payment status", {
    Pending => "PENDING",
    Success => "SUCCESS",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
});

//--------------------------------------     InviteStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteStatus {
    Pending,
    Used,
    Expired,
}

text_enum!(InviteStatus, "invite status", {
    Pending => "PENDING",
    Used => "USED",
    Expired => "EXPIRED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteKind {
    /// A single-use code created on request
    Disposable,
    /// Created when a user redeems another user's personal invite code
    Permanent,
}

text_enum!(InviteKind, "invite kind", {
    Disposable => "DISPOSABLE",
    Permanent => "PERMANENT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteCommissionStatus {
    Pending,
    Paid,
    Cancelled,
}

text_enum!(InviteCommissionStatus, "invite commission status", {
    Pending => "PENDING",
    Paid => "PAID",
    Cancelled => "CANCELLED",
});

//--------------------------------------   MembershipStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipStatus {
    None,
    Active,
    Expired,
}

text_enum!(MembershipStatus, "membership status", {
    None => "NONE",
    Active => "ACTIVE",
    Expired => "EXPIRED",
});

//--------------------------------------     UserAccount      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    pub balance: Money,
    pub score: i64,
    pub experience: i64,
    pub level: i64,
    pub membership_level: i64,
    pub membership_status: MembershipStatus,
    pub membership_start_date: Option<DateTime<Utc>>,
    pub membership_end_date: Option<DateTime<Utc>>,
    pub membership_lifetime: bool,
    pub personal_invite_code: String,
    pub inviter_id: Option<i64>,
    pub invited_with_code: Option<String>,
    pub invite_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn membership(&self) -> Membership {
        Membership {
            level: self.membership_level,
            status: self.membership_status,
            start_date: self.membership_start_date,
            end_date: self.membership_end_date,
            lifetime: self.membership_lifetime,
        }
    }
}

/// The membership fields of a [`UserAccount`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub level: i64,
    pub status: MembershipStatus,
    pub start_date: Option<DateTime<Utc>>,
    /// `None` for lifetime members and for users that have never been members.
    pub end_date: Option<DateTime<Utc>>,
    pub lifetime: bool,
}

//--------------------------------------  LedgerTransaction   ---------------------------------------------------------
/// An immutable record of a single balance change. `amount` is signed: debits are negative, credits positive.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: i64,
    pub user_id: i64,
    pub tx_type: TransactionType,
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub order_id: Option<i64>,
    pub payment_id: Option<i64>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ScoreTransaction {
    pub id: i64,
    pub user_id: i64,
    pub delta: i64,
    pub score_before: i64,
    pub score_after: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     OrderDetails     ---------------------------------------------------------
/// Type-specific order data. The variant determines the [`OrderType`] of the order, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderDetails {
    #[serde(rename_all = "camelCase")]
    Membership {
        level: i64,
        #[serde(default)]
        duration_months: u32,
        #[serde(default)]
        is_lifetime: bool,
    },
    #[serde(rename_all = "camelCase")]
    Article { article_id: i64 },
    #[serde(rename_all = "camelCase")]
    Product {
        product_id: i64,
        #[serde(default = "default_quantity")]
        quantity: u32,
    },
    #[serde(rename_all = "camelCase")]
    Service {
        service_id: i64,
        #[serde(default)]
        description: String,
    },
}

fn default_quantity() -> u32 {
    1
}

impl OrderDetails {
    pub fn order_type(&self) -> OrderType {
        match self {
            OrderDetails::Membership { .. } => OrderType::Membership,
            OrderDetails::Article { .. } => OrderType::Article,
            OrderDetails::Product { .. } => OrderType::Product,
            OrderDetails::Service { .. } => OrderType::Service,
        }
    }

    pub fn article_id(&self) -> Option<i64> {
        match self {
            OrderDetails::Article { article_id } => Some(*article_id),
            _ => None,
        }
    }
}

//--------------------------------------        Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    /// The buyer
    pub user_id: i64,
    /// The seller, who receives the author share on settlement
    pub author_id: i64,
    pub amount: Money,
    pub details: OrderDetails,
}

impl NewOrder {
    pub fn new(user_id: i64, author_id: i64, amount: Money, details: OrderDetails) -> Self {
        Self { user_id, author_id, amount, details }
    }

    pub fn order_type(&self) -> OrderType {
        self.details.order_type()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_no: String,
    pub user_id: i64,
    pub author_id: i64,
    pub order_type: OrderType,
    pub amount: Money,
    pub status: OrderStatusType,
    #[sqlx(json)]
    pub details: OrderDetails,
    pub payment_method: Option<PaymentMethod>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    PaymentRecord     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub order_id: i64,
    pub user_id: i64,
    pub payment_method: PaymentMethod,
    pub amount: Money,
    pub status: PaymentStatus,
    pub third_party_order_no: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      InviteLink      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct InviteLink {
    pub id: i64,
    pub inviter_id: i64,
    pub invitee_id: Option<i64>,
    pub code: String,
    pub kind: InviteKind,
    pub status: InviteStatus,
    pub commission_rate: Rate,
    pub expires_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InviteLink {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| t < now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct InviteCommissionRecord {
    pub id: i64,
    pub invite_id: i64,
    pub inviter_id: i64,
    pub invitee_id: i64,
    pub order_id: i64,
    pub order_amount: Money,
    pub commission_rate: Rate,
    pub commission_amount: Money,
    pub status: InviteCommissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn enums_round_trip_through_text() {
        assert_eq!(OrderStatusType::Paid.to_string(), "PAID");
        assert_eq!("paid".parse::<OrderStatusType>().unwrap(), OrderStatusType::Paid);
        assert_eq!("article".parse::<ContentType>().unwrap(), OrderType::Article);
        assert!("bitcoin".parse::<PaymentMethod>().is_err());
        assert!(PaymentMethod::Epay.is_third_party());
        assert!(!PaymentMethod::Balance.is_third_party());
    }

    #[test]
    fn order_details_json() {
        let details: OrderDetails = serde_json::from_str(r#"{"type":"ARTICLE","articleId":42}"#).unwrap();
        assert_eq!(details, OrderDetails::Article { article_id: 42 });
        assert_eq!(details.order_type(), OrderType::Article);
        assert_eq!(details.article_id(), Some(42));

        let details: OrderDetails =
            serde_json::from_str(r#"{"type":"MEMBERSHIP","level":2,"durationMonths":3}"#).unwrap();
        assert_eq!(details, OrderDetails::Membership { level: 2, duration_months: 3, is_lifetime: false });
        assert_eq!(details.article_id(), None);

        let json = serde_json::to_string(&OrderDetails::Product { product_id: 7, quantity: 2 }).unwrap();
        assert_eq!(json, r#"{"type":"PRODUCT","productId":7,"quantity":2}"#);
    }
}
