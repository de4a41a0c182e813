//! Postgres implementation of the read-path gateway: per-intent retrieval
//! over the derived tables, always enriched with the latest price.

use crate::application::query::{Intent, IntentKind, QueryFilters, QueryGateway};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

pub struct PgQueryService {
    pool: PgPool,
}

impl PgQueryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn signal_results(
        &self,
        signal_type: &str,
        symbols: &[String],
        cutoff: DateTime<Utc>,
        filters: &QueryFilters,
        order_by_spike_ratio: bool,
    ) -> Result<Vec<Value>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT se.id, c.symbol, c.name, se.signal_type, se.detected_at,
                   se.confidence, se.trigger_price, se.volume_spike_ratio, se.metadata,
                   pd.price_usd AS current_price
            FROM signal_events se
            JOIN cryptocurrencies c ON se.crypto_id = c.id
            LEFT JOIN LATERAL (
                SELECT price_usd FROM price_data
                WHERE crypto_id = se.crypto_id
                ORDER BY timestamp DESC LIMIT 1
            ) pd ON TRUE
            WHERE se.signal_type = "#,
        );
        builder.push_bind(signal_type);
        builder.push(" AND se.confidence >= ").push_bind(filters.min_confidence);
        builder.push(" AND se.detected_at >= ").push_bind(cutoff);
        if !symbols.is_empty() {
            builder.push(" AND c.symbol = ANY(").push_bind(symbols.to_vec()).push(")");
        }
        if order_by_spike_ratio {
            builder.push(" ORDER BY se.detected_at DESC, se.volume_spike_ratio DESC NULLS LAST");
        } else {
            builder.push(" ORDER BY se.detected_at DESC, se.confidence DESC");
        }
        builder.push(" LIMIT ").push_bind(filters.limit);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch {signal_type} signals"))?;

        rows.iter().map(format_signal_row).collect()
    }

    async fn trend_results(
        &self,
        trend_type: &str,
        symbols: &[String],
        cutoff: DateTime<Utc>,
        filters: &QueryFilters,
    ) -> Result<Vec<Value>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT ta.id, c.symbol, c.name, ta.trend_type, ta.timeframe, ta.confidence,
                   ta.price_change_percent, ta.start_time, ta.end_time, ta.metadata,
                   ta.created_at, pd.price_usd AS current_price
            FROM trend_analysis ta
            JOIN cryptocurrencies c ON ta.crypto_id = c.id
            LEFT JOIN LATERAL (
                SELECT price_usd FROM price_data
                WHERE crypto_id = ta.crypto_id
                ORDER BY timestamp DESC LIMIT 1
            ) pd ON TRUE
            WHERE ta.trend_type = "#,
        );
        builder.push_bind(trend_type);
        builder.push(" AND ta.confidence >= ").push_bind(filters.min_confidence);
        builder.push(" AND ta.created_at >= ").push_bind(cutoff);
        builder
            .push(" AND ta.timeframe = ")
            .push_bind(filters.timeframe.as_str());
        if !symbols.is_empty() {
            builder.push(" AND c.symbol = ANY(").push_bind(symbols.to_vec()).push(")");
        }
        builder.push(" ORDER BY ta.created_at DESC, ta.confidence DESC");
        builder.push(" LIMIT ").push_bind(filters.limit);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch trend analysis")?;

        rows.iter()
            .map(|row| {
                Ok(json!({
                    "id": row.try_get::<i64, _>("id")?,
                    "cryptocurrency": {
                        "symbol": row.try_get::<String, _>("symbol")?,
                        "name": row.try_get::<String, _>("name")?,
                    },
                    "trend_type": row.try_get::<String, _>("trend_type")?,
                    "timeframe": row.try_get::<String, _>("timeframe")?,
                    "confidence": row.try_get::<f64, _>("confidence")?,
                    "price_change_percent": row.try_get::<f64, _>("price_change_percent")?,
                    "current_price": row.try_get::<Option<f64>, _>("current_price")?,
                    "analysis_period": {
                        "start_time": row.try_get::<DateTime<Utc>, _>("start_time")?.to_rfc3339(),
                        "end_time": row.try_get::<DateTime<Utc>, _>("end_time")?.to_rfc3339(),
                    },
                    "detected_at": row.try_get::<DateTime<Utc>, _>("created_at")?.to_rfc3339(),
                    "metadata": row.try_get::<Value, _>("metadata")?,
                }))
            })
            .collect()
    }

    /// Volatility is computed on the fly over the bar series within the
    /// cutoff window; assets need at least five samples and over 5%
    /// coefficient of variation.
    async fn volatility_results(
        &self,
        symbols: &[String],
        cutoff: DateTime<Utc>,
        filters: &QueryFilters,
    ) -> Result<Vec<Value>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            WITH price_stats AS (
                SELECT pd.crypto_id, c.symbol, c.name,
                       STDDEV(pd.price_usd) / AVG(pd.price_usd) * 100 AS volatility,
                       AVG(pd.price_usd) AS avg_price,
                       MAX(pd.price_usd) AS max_price,
                       MIN(pd.price_usd) AS min_price,
                       COUNT(*) AS data_points
                FROM price_data pd
                JOIN cryptocurrencies c ON pd.crypto_id = c.id
                WHERE pd.timestamp >= "#,
        );
        builder.push_bind(cutoff);
        builder.push(" AND c.is_active = TRUE");
        if !symbols.is_empty() {
            builder.push(" AND c.symbol = ANY(").push_bind(symbols.to_vec()).push(")");
        }
        builder.push(
            r#"
                GROUP BY pd.crypto_id, c.symbol, c.name
                HAVING COUNT(*) >= 5
            )
            SELECT ps.*, pd.price_usd AS current_price
            FROM price_stats ps
            LEFT JOIN LATERAL (
                SELECT price_usd FROM price_data
                WHERE crypto_id = ps.crypto_id
                ORDER BY timestamp DESC LIMIT 1
            ) pd ON TRUE
            WHERE ps.volatility > 5
            ORDER BY ps.volatility DESC
            LIMIT "#,
        );
        builder.push_bind(filters.limit);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch volatility analysis")?;

        rows.iter()
            .map(|row| {
                Ok(json!({
                    "cryptocurrency": {
                        "symbol": row.try_get::<String, _>("symbol")?,
                        "name": row.try_get::<String, _>("name")?,
                    },
                    "volatility_percent": row.try_get::<f64, _>("volatility")?,
                    "price_range": {
                        "min": row.try_get::<f64, _>("min_price")?,
                        "max": row.try_get::<f64, _>("max_price")?,
                        "avg": row.try_get::<f64, _>("avg_price")?,
                    },
                    "current_price": row.try_get::<Option<f64>, _>("current_price")?,
                    "data_points": row.try_get::<i64, _>("data_points")?,
                    "timeframe": filters.timeframe.as_str(),
                }))
            })
            .collect()
    }

    /// Activity score: signal events plus trend records within the cutoff.
    async fn trending_results(
        &self,
        cutoff: DateTime<Utc>,
        filters: &QueryFilters,
    ) -> Result<Vec<Value>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            WITH trending_scores AS (
                SELECT c.id, c.symbol, c.name,
                       COALESCE(s.signal_count, 0) + COALESCE(t.trend_count, 0) AS activity_score,
                       COALESCE(s.signal_count, 0) AS recent_signals,
                       COALESCE(t.trend_count, 0) AS recent_trends
                FROM cryptocurrencies c
                LEFT JOIN (
                    SELECT crypto_id, COUNT(*) AS signal_count
                    FROM signal_events WHERE detected_at >= "#,
        );
        builder.push_bind(cutoff);
        builder.push(
            r#" GROUP BY crypto_id
                ) s ON c.id = s.crypto_id
                LEFT JOIN (
                    SELECT crypto_id, COUNT(*) AS trend_count
                    FROM trend_analysis WHERE created_at >= "#,
        );
        builder.push_bind(cutoff);
        builder.push(
            r#" GROUP BY crypto_id
                ) t ON c.id = t.crypto_id
                WHERE c.is_active = TRUE
                  AND (COALESCE(s.signal_count, 0) + COALESCE(t.trend_count, 0)) > 0
            )
            SELECT ts.*, pd.price_usd AS current_price, pd.percent_change_24h
            FROM trending_scores ts
            LEFT JOIN LATERAL (
                SELECT price_usd, percent_change_24h FROM price_data
                WHERE crypto_id = ts.id
                ORDER BY timestamp DESC LIMIT 1
            ) pd ON TRUE
            ORDER BY ts.activity_score DESC, ts.recent_signals DESC
            LIMIT "#,
        );
        builder.push_bind(filters.limit);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch trending analysis")?;

        rows.iter()
            .map(|row| {
                Ok(json!({
                    "cryptocurrency": {
                        "symbol": row.try_get::<String, _>("symbol")?,
                        "name": row.try_get::<String, _>("name")?,
                    },
                    "activity_score": row.try_get::<i64, _>("activity_score")?,
                    "recent_signals": row.try_get::<i64, _>("recent_signals")?,
                    "recent_trends": row.try_get::<i64, _>("recent_trends")?,
                    "current_price": row.try_get::<Option<f64>, _>("current_price")?,
                    "price_change_24h": row.try_get::<Option<f64>, _>("percent_change_24h")?,
                    "timeframe": filters.timeframe.as_str(),
                }))
            })
            .collect()
    }

    /// Rank assets by the latest percent change matching the timeframe.
    async fn performance_results(
        &self,
        symbols: &[String],
        filters: &QueryFilters,
    ) -> Result<Vec<Value>> {
        let order_column = match filters.timeframe.as_str() {
            "1h" => "pd.percent_change_1h",
            "7d" => "pd.percent_change_7d",
            _ => "pd.percent_change_24h",
        };

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT c.symbol, c.name, pd.price_usd AS current_price,
                   pd.percent_change_1h, pd.percent_change_24h, pd.percent_change_7d,
                   pd.volume_24h, pd.market_cap
            FROM cryptocurrencies c
            LEFT JOIN LATERAL (
                SELECT price_usd, percent_change_1h, percent_change_24h,
                       percent_change_7d, volume_24h, market_cap
                FROM price_data
                WHERE crypto_id = c.id
                ORDER BY timestamp DESC LIMIT 1
            ) pd ON TRUE
            WHERE c.is_active = TRUE AND pd.price_usd IS NOT NULL
            "#,
        );
        if !symbols.is_empty() {
            builder.push(" AND c.symbol = ANY(").push_bind(symbols.to_vec()).push(")");
        }
        builder.push(" ORDER BY ").push(order_column).push(" DESC NULLS LAST");
        builder.push(" LIMIT ").push_bind(filters.limit);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch performance analysis")?;

        rows.iter()
            .map(|row| {
                Ok(json!({
                    "cryptocurrency": {
                        "symbol": row.try_get::<String, _>("symbol")?,
                        "name": row.try_get::<String, _>("name")?,
                    },
                    "current_price": row.try_get::<Option<f64>, _>("current_price")?,
                    "performance": {
                        "change_1h": row.try_get::<Option<f64>, _>("percent_change_1h")?,
                        "change_24h": row.try_get::<Option<f64>, _>("percent_change_24h")?,
                        "change_7d": row.try_get::<Option<f64>, _>("percent_change_7d")?,
                    },
                    "volume_24h": row.try_get::<Option<f64>, _>("volume_24h")?,
                    "market_cap": row.try_get::<Option<f64>, _>("market_cap")?,
                    "timeframe": filters.timeframe.as_str(),
                }))
            })
            .collect()
    }
}

fn format_signal_row(row: &PgRow) -> Result<Value> {
    Ok(json!({
        "id": row.try_get::<i64, _>("id")?,
        "cryptocurrency": {
            "symbol": row.try_get::<String, _>("symbol")?,
            "name": row.try_get::<String, _>("name")?,
        },
        "signal_type": row.try_get::<String, _>("signal_type")?,
        "detected_at": row.try_get::<DateTime<Utc>, _>("detected_at")?.to_rfc3339(),
        "confidence": row.try_get::<f64, _>("confidence")?,
        "trigger_price": row.try_get::<Option<f64>, _>("trigger_price")?,
        "current_price": row.try_get::<Option<f64>, _>("current_price")?,
        "volume_spike_ratio": row.try_get::<Option<f64>, _>("volume_spike_ratio")?,
        "metadata": row.try_get::<Value, _>("metadata")?,
    }))
}

#[async_trait]
impl QueryGateway for PgQueryService {
    async fn results_for_intent(
        &self,
        intent: &Intent,
        filters: &QueryFilters,
    ) -> Result<Vec<Value>> {
        let cutoff = filters.timeframe.cutoff(Utc::now());
        let symbols = &intent.cryptocurrencies;

        match intent.kind {
            IntentKind::PumpAndDump => {
                self.signal_results("pump_and_dump", symbols, cutoff, filters, false)
                    .await
            }
            IntentKind::BottomedOut => {
                self.signal_results("bottomed_out", symbols, cutoff, filters, false)
                    .await
            }
            IntentKind::VolumeSpike => {
                self.signal_results("volume_anomaly", symbols, cutoff, filters, true)
                    .await
            }
            IntentKind::Uptrend => {
                self.trend_results("uptrend", symbols, cutoff, filters).await
            }
            IntentKind::Downtrend => {
                self.trend_results("downtrend", symbols, cutoff, filters).await
            }
            IntentKind::HighVolatility => {
                self.volatility_results(symbols, cutoff, filters).await
            }
            IntentKind::Trending => self.trending_results(cutoff, filters).await,
            IntentKind::Performance => self.performance_results(symbols, filters).await,
        }
    }

    async fn log_query(
        &self,
        query_text: &str,
        intent: &Intent,
        result_count: usize,
        execution_time_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO query_logs (
                query_text, intent_type, intent_confidence,
                result_count, execution_time_ms, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(query_text)
        .bind(intent.kind.as_str())
        .bind(intent.confidence)
        .bind(result_count as i32)
        .bind(execution_time_ms)
        .bind(serde_json::to_value(intent)?)
        .execute(&self.pool)
        .await
        .context("Failed to log query")?;

        Ok(())
    }
}
