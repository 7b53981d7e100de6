//! Commission rates and the arithmetic that splits a sale between the parties.
//!
//! The split functions are pure: [`content_split`] and [`order_split`] take a [`CommissionConfig`] and an amount and
//! do no I/O. [`CommissionApi`] loads the configuration from the backend, caches it, and feeds it to them.
use std::{fmt::Debug, sync::Arc};

use log::*;
use tokio::sync::RwLock;

use crate::{
    cpe_api::commission_objects::{CommissionConfig, ContentSplit, OrderSplit, RateSource, UserCommissionOverride},
    db_types::{ContentType, Money, Rate},
    traits::{CommissionError, CommissionSettings},
};

/// Splits a content sale into the platform commission and the payee's share.
///
/// An enabled override for the payee and content type replaces the global rate.
pub fn content_split(
    config: &CommissionConfig,
    user_override: Option<&UserCommissionOverride>,
    amount: Money,
    content_type: ContentType,
) -> ContentSplit {
    let (commission_rate, source) = match user_override {
        Some(o) if o.enabled && o.content_type == content_type => (o.rate, RateSource::User),
        _ => (config.content_rates.rate_for(content_type), RateSource::Global),
    };
    let commission_amount = amount.apply_rate(commission_rate);
    ContentSplit { commission_amount, commission_rate, payee_amount: amount - commission_amount, source }
}

/// The platform, author and inviter shares of a paid order. The shares are computed independently and are not
/// forced to add up to `amount`.
pub fn order_split(config: &CommissionConfig, amount: Money) -> OrderSplit {
    OrderSplit {
        platform_amount: amount.apply_rate(config.platform_rate),
        author_amount: amount.apply_rate(config.author_rate),
        inviter_amount: amount.apply_rate(config.inviter_rate),
        platform_rate: config.platform_rate,
        author_rate: config.author_rate,
        inviter_rate: config.inviter_rate,
    }
}

pub fn validate_rate(name: &str, rate: Rate) -> Result<(), CommissionError> {
    Rate::try_from_ppm(rate.ppm()).map(|_| ()).map_err(|e| CommissionError::InvalidRate(format!("{name}: {e}")))
}

pub fn validate_config(config: &CommissionConfig) -> Result<(), CommissionError> {
    for content_type in ContentType::ALL {
        validate_rate(&content_type.to_string(), config.content_rates.rate_for(content_type))?;
    }
    validate_rate("platform_rate", config.platform_rate)?;
    validate_rate("author_rate", config.author_rate)?;
    validate_rate("inviter_rate", config.inviter_rate)?;
    validate_rate("default_invite_rate", config.default_invite_rate)?;
    let total = config.platform_rate.ppm() + config.author_rate.ppm() + config.inviter_rate.ppm();
    if total != Rate::ONE.ppm() {
        warn!("🪛️ Settlement rates add up to {} ppm, not 100%. The difference is not distributed.", total);
    }
    Ok(())
}

/// Cached access to the commission configuration. Clones share the cache.
#[derive(Clone)]
pub struct CommissionApi<B> {
    db: B,
    cache: Arc<RwLock<Option<CommissionConfig>>>,
}

impl<B: Debug> Debug for CommissionApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommissionApi ({:?})", self.db)
    }
}

impl<B> CommissionApi<B>
where B: CommissionSettings
{
    pub fn new(db: B) -> Self {
        Self { db, cache: Arc::new(RwLock::new(None)) }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// The current configuration, from the cache if it is populated.
    pub async fn config(&self) -> Result<CommissionConfig, CommissionError> {
        if let Some(config) = *self.cache.read().await {
            return Ok(config);
        }
        let mut cache = self.cache.write().await;
        // Another task may have filled the cache while we waited for the lock
        if let Some(config) = *cache {
            return Ok(config);
        }
        let config = self.db.fetch_commission_config().await?;
        trace!("🪛️ Commission configuration loaded from the database");
        *cache = Some(config);
        Ok(config)
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        trace!("🪛️ Commission configuration cache cleared");
    }

    pub async fn update_global_config(&self, config: CommissionConfig) -> Result<CommissionConfig, CommissionError> {
        validate_config(&config)?;
        self.db.update_commission_config(&config).await?;
        self.invalidate().await;
        info!("🪛️ Global commission configuration updated");
        Ok(config)
    }

    pub async fn set_user_override(&self, value: UserCommissionOverride) -> Result<(), CommissionError> {
        validate_rate("override", value.rate)?;
        self.db.upsert_user_override(&value).await
    }

    /// Prices a sale of `amount` by `user_id`, using the user's override for `content_type` if one is set.
    pub async fn split_for_content(
        &self,
        user_id: i64,
        amount: Money,
        content_type: ContentType,
    ) -> Result<ContentSplit, CommissionError> {
        if !amount.is_positive() {
            return Err(CommissionError::AmountMustBePositive(amount));
        }
        let config = self.config().await?;
        let user_override = self.db.fetch_user_override(user_id, content_type).await?;
        Ok(content_split(&config, user_override.as_ref(), amount, content_type))
    }

    pub async fn split_for_order_settlement(&self, amount: Money) -> Result<OrderSplit, CommissionError> {
        let config = self.config().await?;
        Ok(order_split(&config, amount))
    }
}
