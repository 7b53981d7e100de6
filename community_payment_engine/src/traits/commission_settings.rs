use thiserror::Error;

use crate::{
    cpe_api::commission_objects::{CommissionConfig, UserCommissionOverride},
    db_types::{ContentType, Money},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommissionError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid commission rate: {0}")]
    InvalidRate(String),
    #[error("Commission configuration is missing from the database: {0}")]
    ConfigurationMissing(String),
    #[error("Commission can only be quoted on a positive amount. Got {0}")]
    AmountMustBePositive(Money),
}

impl From<sqlx::Error> for CommissionError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

/// Persistence for commission rates. Reads happen on every settlement, so API layers are expected to cache
/// [`CommissionConfig`].
#[allow(async_fn_in_trait)]
pub trait CommissionSettings {
    async fn fetch_commission_config(&self) -> Result<CommissionConfig, CommissionError>;

    async fn update_commission_config(&self, config: &CommissionConfig) -> Result<(), CommissionError>;

    async fn fetch_user_override(
        &self,
        user_id: i64,
        content_type: ContentType,
    ) -> Result<Option<UserCommissionOverride>, CommissionError>;

    async fn upsert_user_override(&self, value: &UserCommissionOverride) -> Result<(), CommissionError>;
}
