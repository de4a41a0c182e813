use crate::domain::repositories::TrendRepository;
use crate::domain::types::TrendRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PgTrendRepository {
    pool: PgPool,
}

impl PgTrendRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrendRepository for PgTrendRepository {
    async fn upsert(&self, record: &TrendRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trend_analysis (
                crypto_id, timeframe, trend_type, confidence,
                start_time, end_time, price_change_percent, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (crypto_id, timeframe, start_time) DO UPDATE SET
                trend_type = EXCLUDED.trend_type,
                confidence = EXCLUDED.confidence,
                end_time = EXCLUDED.end_time,
                price_change_percent = EXCLUDED.price_change_percent,
                metadata = EXCLUDED.metadata,
                created_at = NOW()
            "#,
        )
        .bind(record.asset_id)
        .bind(record.timeframe.as_str())
        .bind(record.trend_type.as_str())
        .bind(record.confidence)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.price_change_percent)
        .bind(&record.metadata)
        .execute(&self.pool)
        .await
        .context("Failed to upsert trend analysis")?;

        Ok(())
    }
}
