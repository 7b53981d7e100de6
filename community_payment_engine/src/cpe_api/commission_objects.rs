use cpg_common::{Money, Rate};
use serde::{Deserialize, Serialize};

use crate::db_types::ContentType;

/// Global commission rate per content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRates {
    pub article: Rate,
    pub membership: Rate,
    pub product: Rate,
    pub service: Rate,
}

impl Default for ContentRates {
    fn default() -> Self {
        Self {
            article: Rate::percent(10),
            membership: Rate::percent(10),
            product: Rate::percent(10),
            service: Rate::percent(10),
        }
    }
}

impl ContentRates {
    pub fn rate_for(&self, content_type: ContentType) -> Rate {
        match content_type {
            ContentType::Article => self.article,
            ContentType::Membership => self.membership,
            ContentType::Product => self.product,
            ContentType::Service => self.service,
        }
    }

    pub fn set_rate(&mut self, content_type: ContentType, rate: Rate) {
        match content_type {
            ContentType::Article => self.article = rate,
            ContentType::Membership => self.membership = rate,
            ContentType::Product => self.product = rate,
            ContentType::Service => self.service = rate,
        }
    }
}

/// The complete commission configuration.
///
/// The three settlement rates are intentionally not required to sum to 1. Whatever they do not cover is simply not
/// distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionConfig {
    pub content_rates: ContentRates,
    pub platform_rate: Rate,
    pub author_rate: Rate,
    pub inviter_rate: Rate,
    /// The rate stamped on newly created invite links when the inviter does not choose one
    pub default_invite_rate: Rate,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            content_rates: ContentRates::default(),
            platform_rate: Rate::percent(10),
            author_rate: Rate::percent(85),
            inviter_rate: Rate::percent(5),
            default_invite_rate: Rate::percent(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCommissionOverride {
    pub user_id: i64,
    pub content_type: ContentType,
    pub rate: Rate,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    /// The user's own override was applied
    User,
    /// The global per-content-type rate was applied
    Global,
}

/// The split of a content sale between the platform (commission) and the payee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSplit {
    pub commission_amount: Money,
    pub commission_rate: Rate,
    pub payee_amount: Money,
    pub source: RateSource,
}

/// The three-way split of a paid order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSplit {
    pub platform_amount: Money,
    pub author_amount: Money,
    pub inviter_amount: Money,
    pub platform_rate: Rate,
    pub author_rate: Rate,
    pub inviter_rate: Rate,
}

impl OrderSplit {
    /// The portion of the order amount that none of the three parties receive. Negative if the rates sum to more
    /// than 1.
    pub fn undistributed(&self, amount: Money) -> Money {
        amount - self.platform_amount - self.author_amount - self.inviter_amount
    }
}
