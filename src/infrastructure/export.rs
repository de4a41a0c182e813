//! CSV export of the derived tables, one timestamped file per table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::path::{Path, PathBuf};
use tracing::info;

pub async fn export_all(pool: &PgPool, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let trends = export_trends(pool, dir).await?;
    let signals = export_signals(pool, dir).await?;
    Ok((trends, signals))
}

pub async fn export_trends(pool: &PgPool, dir: &Path) -> Result<PathBuf> {
    let rows = sqlx::query(
        r#"
        SELECT c.symbol, c.name, ta.timeframe, ta.trend_type, ta.confidence,
               ta.price_change_percent, ta.start_time, ta.end_time, ta.metadata, ta.created_at
        FROM trend_analysis ta
        JOIN cryptocurrencies c ON ta.crypto_id = c.id
        ORDER BY ta.created_at DESC, c.symbol
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to fetch trend analysis for export")?;

    let path = dir.join(format!(
        "trend_analysis_{}.csv",
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record([
        "symbol",
        "name",
        "timeframe",
        "trend_type",
        "confidence",
        "price_change_percent",
        "start_time",
        "end_time",
        "metadata",
        "created_at",
    ])?;

    let count = rows.len();
    for row in rows {
        writer.write_record([
            row.try_get::<String, _>("symbol")?,
            row.try_get::<String, _>("name")?,
            row.try_get::<String, _>("timeframe")?,
            row.try_get::<String, _>("trend_type")?,
            row.try_get::<f64, _>("confidence")?.to_string(),
            row.try_get::<f64, _>("price_change_percent")?.to_string(),
            row.try_get::<DateTime<Utc>, _>("start_time")?.to_rfc3339(),
            row.try_get::<DateTime<Utc>, _>("end_time")?.to_rfc3339(),
            row.try_get::<serde_json::Value, _>("metadata")?.to_string(),
            row.try_get::<DateTime<Utc>, _>("created_at")?.to_rfc3339(),
        ])?;
    }
    writer.flush()?;

    info!(count, path = %path.display(), "exported trend records");
    Ok(path)
}

pub async fn export_signals(pool: &PgPool, dir: &Path) -> Result<PathBuf> {
    let rows = sqlx::query(
        r#"
        SELECT c.symbol, c.name, se.signal_type, se.confidence, se.trigger_price,
               se.volume_spike_ratio, se.detected_at, se.metadata, se.created_at
        FROM signal_events se
        JOIN cryptocurrencies c ON se.crypto_id = c.id
        ORDER BY se.created_at DESC, c.symbol
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to fetch signal events for export")?;

    let path = dir.join(format!(
        "signal_events_{}.csv",
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record([
        "symbol",
        "name",
        "signal_type",
        "confidence",
        "trigger_price",
        "volume_spike_ratio",
        "detected_at",
        "metadata",
        "created_at",
    ])?;

    let count = rows.len();
    for row in rows {
        writer.write_record([
            row.try_get::<String, _>("symbol")?,
            row.try_get::<String, _>("name")?,
            row.try_get::<String, _>("signal_type")?,
            row.try_get::<f64, _>("confidence")?.to_string(),
            row.try_get::<Option<f64>, _>("trigger_price")?
                .map(|v| v.to_string())
                .unwrap_or_default(),
            row.try_get::<Option<f64>, _>("volume_spike_ratio")?
                .map(|v| v.to_string())
                .unwrap_or_default(),
            row.try_get::<DateTime<Utc>, _>("detected_at")?.to_rfc3339(),
            row.try_get::<serde_json::Value, _>("metadata")?.to_string(),
            row.try_get::<DateTime<Utc>, _>("created_at")?.to_rfc3339(),
        ])?;
    }
    writer.flush()?;

    info!(count, path = %path.display(), "exported signal events");
    Ok(path)
}
