use crate::domain::repositories::SignalRepository;
use crate::domain::types::{SignalEvent, SignalType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

pub struct PgSignalRepository {
    pool: PgPool,
}

impl PgSignalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalRepository for PgSignalRepository {
    async fn insert(&self, event: &SignalEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signal_events (
                crypto_id, signal_type, detected_at, confidence,
                trigger_price, volume_spike_ratio, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.asset_id)
        .bind(event.signal_type.as_str())
        .bind(event.detected_at)
        .bind(event.confidence)
        .bind(event.trigger_price)
        .bind(event.volume_spike_ratio)
        .bind(&event.metadata)
        .execute(&self.pool)
        .await
        .context("Failed to insert signal event")?;

        Ok(())
    }

    async fn find_since(&self, asset_id: i32, since: DateTime<Utc>) -> Result<Vec<SignalEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT signal_type, detected_at, confidence,
                   trigger_price, volume_spike_ratio, metadata
            FROM signal_events
            WHERE crypto_id = $1 AND detected_at >= $2
            ORDER BY detected_at ASC
            "#,
        )
        .bind(asset_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch signal events for crypto {asset_id}"))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let type_str: String = row.try_get("signal_type")?;
            events.push(SignalEvent {
                asset_id,
                signal_type: type_str.parse::<SignalType>()?,
                detected_at: row.try_get("detected_at")?,
                confidence: row.try_get("confidence")?,
                trigger_price: row.try_get("trigger_price")?,
                volume_spike_ratio: row.try_get("volume_spike_ratio")?,
                metadata: row.try_get("metadata")?,
            });
        }
        Ok(events)
    }
}
