//! Settings Store
//!
//! Key-value platform settings read from the database. The core reads the
//! minimum withdrawal threshold here; everything else in the settings table
//! belongs to the outer product surfaces.

use rust_decimal::Decimal;
use sqlx::PgPool;
use std::str::FromStr;

use crate::domain::Amount;

/// Setting key for the minimum withdrawal threshold
pub const MINIMUM_WITHDRAWAL_KEY: &str = "minimum_withdrawal_amount";

/// Default minimum withdrawal (currency units) when the setting is absent
pub const DEFAULT_MINIMUM_WITHDRAWAL: &str = "25.00";

/// Store for platform settings
#[derive(Debug, Clone)]
pub struct SettingsStore {
    pool: PgPool,
}

impl SettingsStore {
    /// Create a new SettingsStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Read a raw setting value
    pub async fn get(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    /// The configured minimum withdrawal amount.
    ///
    /// Falls back to the default when the setting is absent; a malformed
    /// stored value is logged and the default used, so a bad admin edit
    /// cannot take withdrawals down.
    pub async fn minimum_withdrawal_amount(&self) -> Result<Amount, sqlx::Error> {
        let stored = self.get(MINIMUM_WITHDRAWAL_KEY).await?;

        let amount = match stored {
            Some(raw) => match raw.parse::<Amount>() {
                Ok(amount) => amount,
                Err(e) => {
                    tracing::warn!(
                        key = MINIMUM_WITHDRAWAL_KEY,
                        value = %raw,
                        error = %e,
                        "Malformed setting value, using default"
                    );
                    default_minimum()
                }
            },
            None => default_minimum(),
        };

        Ok(amount)
    }

    /// Seed the default minimum withdrawal if no row exists yet.
    /// Called once at startup.
    pub async fn ensure_defaults(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(MINIMUM_WITHDRAWAL_KEY)
        .bind(DEFAULT_MINIMUM_WITHDRAWAL)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn default_minimum() -> Amount {
    let value = Decimal::from_str(DEFAULT_MINIMUM_WITHDRAWAL)
        .expect("Invalid DEFAULT_MINIMUM_WITHDRAWAL constant");
    Amount::new(value).expect("Invalid DEFAULT_MINIMUM_WITHDRAWAL constant")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_minimum_is_valid() {
        let amount = default_minimum();
        assert_eq!(amount.value(), Decimal::new(2500, 2));
    }
}
