use log::debug;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    cpe_api::commission_objects::{CommissionConfig, ContentRates, UserCommissionOverride},
    db_types::{ContentType, Rate},
    traits::CommissionError,
};

#[derive(Debug, FromRow)]
struct SettlementRatesRow {
    platform_rate: Rate,
    author_rate: Rate,
    inviter_rate: Rate,
    default_invite_rate: Rate,
}

#[derive(Debug, FromRow)]
struct OverrideRow {
    user_id: i64,
    content_type: ContentType,
    rate: Rate,
    enabled: bool,
}

impl From<OverrideRow> for UserCommissionOverride {
    fn from(row: OverrideRow) -> Self {
        Self { user_id: row.user_id, content_type: row.content_type, rate: row.rate, enabled: row.enabled }
    }
}

/// Loads the per-content-type rates and the settlement rates. Every content type must have a row.
pub async fn fetch_commission_config(conn: &mut SqliteConnection) -> Result<CommissionConfig, CommissionError> {
    let rows: Vec<(ContentType, Rate)> =
        sqlx::query_as("SELECT content_type, rate FROM commission_settings").fetch_all(&mut *conn).await?;
    let mut content_rates = ContentRates::default();
    for content_type in ContentType::ALL {
        let rate = rows
            .iter()
            .find(|(ct, _)| *ct == content_type)
            .map(|(_, rate)| *rate)
            .ok_or_else(|| CommissionError::ConfigurationMissing(format!("No rate for {content_type}")))?;
        content_rates.set_rate(content_type, rate);
    }
    let rates: SettlementRatesRow = sqlx::query_as(
        "SELECT platform_rate, author_rate, inviter_rate, default_invite_rate FROM settlement_rates WHERE id = 1",
    )
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| CommissionError::ConfigurationMissing("No settlement rates".into()))?;
    Ok(CommissionConfig {
        content_rates,
        platform_rate: rates.platform_rate,
        author_rate: rates.author_rate,
        inviter_rate: rates.inviter_rate,
        default_invite_rate: rates.default_invite_rate,
    })
}

/// Overwrites the stored configuration. Run inside a transaction so that readers never see half an update.
pub async fn update_commission_config(
    config: &CommissionConfig,
    conn: &mut SqliteConnection,
) -> Result<(), CommissionError> {
    sqlx::query(
        r#"
        INSERT INTO settlement_rates (id, platform_rate, author_rate, inviter_rate, default_invite_rate)
        VALUES (1, $1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET
            platform_rate = excluded.platform_rate,
            author_rate = excluded.author_rate,
            inviter_rate = excluded.inviter_rate,
            default_invite_rate = excluded.default_invite_rate,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(config.platform_rate)
    .bind(config.author_rate)
    .bind(config.inviter_rate)
    .bind(config.default_invite_rate)
    .execute(&mut *conn)
    .await?;
    for content_type in ContentType::ALL {
        sqlx::query(
            r#"
            INSERT INTO commission_settings (content_type, rate) VALUES ($1, $2)
            ON CONFLICT (content_type) DO UPDATE SET rate = excluded.rate, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(content_type)
        .bind(config.content_rates.rate_for(content_type))
        .execute(&mut *conn)
        .await?;
    }
    debug!("🪛️ Commission configuration updated");
    Ok(())
}

pub async fn fetch_user_override(
    user_id: i64,
    content_type: ContentType,
    conn: &mut SqliteConnection,
) -> Result<Option<UserCommissionOverride>, sqlx::Error> {
    let row: Option<OverrideRow> = sqlx::query_as(
        "SELECT user_id, content_type, rate, enabled FROM user_commission_overrides WHERE user_id = $1 AND \
         content_type = $2",
    )
    .bind(user_id)
    .bind(content_type)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(UserCommissionOverride::from))
}

pub async fn upsert_user_override(
    value: &UserCommissionOverride,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_commission_overrides (user_id, content_type, rate, enabled) VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, content_type) DO UPDATE SET
            rate = excluded.rate,
            enabled = excluded.enabled,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(value.user_id)
    .bind(value.content_type)
    .bind(value.rate)
    .bind(value.enabled)
    .execute(conn)
    .await?;
    debug!(
        "🪛️ Commission override for user #{} on {} set to {} (enabled: {})",
        value.user_id, value.content_type, value.rate, value.enabled
    );
    Ok(())
}
