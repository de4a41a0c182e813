use crate::config::DbConfig;
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Connection pool wrapper owning schema initialization.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.username)
            .password(&config.password)
            .options([(
                "statement_timeout",
                format!("{}s", config.statement_timeout_secs),
            )]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.statement_timeout_secs))
            .connect_with(options)
            .await
            .context("Failed to connect to Postgres database")?;

        info!(
            host = %config.host,
            database = %config.name,
            "Connected to database"
        );

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    /// Initialize database schema. Idempotent; runs on every startup.
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cryptocurrencies (
                id SERIAL PRIMARY KEY,
                symbol TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                coingecko_id TEXT,
                cmc_id BIGINT,
                rank INTEGER,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create cryptocurrencies table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_data (
                crypto_id INTEGER NOT NULL REFERENCES cryptocurrencies(id),
                timestamp TIMESTAMPTZ NOT NULL,
                price_usd DOUBLE PRECISION NOT NULL,
                volume_24h DOUBLE PRECISION NOT NULL DEFAULT 0,
                open_usd DOUBLE PRECISION,
                high_usd DOUBLE PRECISION,
                low_usd DOUBLE PRECISION,
                market_cap DOUBLE PRECISION,
                percent_change_1h DOUBLE PRECISION,
                percent_change_24h DOUBLE PRECISION,
                percent_change_7d DOUBLE PRECISION,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (crypto_id, timestamp)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create price_data table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_price_data_crypto_time
            ON price_data (crypto_id, timestamp DESC);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create price_data index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trend_analysis (
                id BIGSERIAL PRIMARY KEY,
                crypto_id INTEGER NOT NULL REFERENCES cryptocurrencies(id),
                timeframe TEXT NOT NULL,
                trend_type TEXT NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                start_time TIMESTAMPTZ NOT NULL,
                end_time TIMESTAMPTZ NOT NULL,
                price_change_percent DOUBLE PRECISION NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (crypto_id, timeframe, start_time)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create trend_analysis table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_events (
                id BIGSERIAL PRIMARY KEY,
                crypto_id INTEGER NOT NULL REFERENCES cryptocurrencies(id),
                signal_type TEXT NOT NULL,
                detected_at TIMESTAMPTZ NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                trigger_price DOUBLE PRECISION,
                volume_spike_ratio DOUBLE PRECISION,
                metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create signal_events table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_signal_events_crypto_detected
            ON signal_events (crypto_id, detected_at DESC);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create signal_events index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_runs (
                id BIGSERIAL PRIMARY KEY,
                run_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'running',
                records_processed BIGINT NOT NULL DEFAULT 0,
                error_message TEXT,
                notes TEXT,
                started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                completed_at TIMESTAMPTZ
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create analysis_runs table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS query_logs (
                id BIGSERIAL PRIMARY KEY,
                query_text TEXT NOT NULL,
                intent_type TEXT,
                intent_confidence DOUBLE PRECISION,
                result_count INTEGER NOT NULL DEFAULT 0,
                execution_time_ms BIGINT NOT NULL DEFAULT 0,
                metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create query_logs table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
