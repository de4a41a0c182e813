use crate::domain::repositories::BarRepository;
use crate::domain::types::Bar;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

pub struct PgBarRepository {
    pool: PgPool,
}

impl PgBarRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BarRepository for PgBarRepository {
    async fn find_since(&self, asset_id: i32, since: DateTime<Utc>) -> Result<Vec<Bar>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, price_usd, volume_24h, open_usd, high_usd, low_usd,
                   market_cap, percent_change_1h, percent_change_24h, percent_change_7d
            FROM price_data
            WHERE crypto_id = $1 AND timestamp >= $2
            ORDER BY timestamp ASC
            "#,
        )
        .bind(asset_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch price data for crypto {asset_id}"))?;

        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            bars.push(Bar {
                asset_id,
                timestamp: row.try_get("timestamp")?,
                close: row.try_get("price_usd")?,
                volume: row.try_get("volume_24h")?,
                open: row.try_get("open_usd")?,
                high: row.try_get("high_usd")?,
                low: row.try_get("low_usd")?,
                market_cap: row.try_get("market_cap")?,
                percent_change_1h: row.try_get("percent_change_1h")?,
                percent_change_24h: row.try_get("percent_change_24h")?,
                percent_change_7d: row.try_get("percent_change_7d")?,
            });
        }
        Ok(bars)
    }
}
