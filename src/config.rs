use crate::domain::types::AnalysisMode;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Connection parameters for the relational store. Credentials are required;
/// a missing value is a startup failure, not a runtime one.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub name: String,
    pub username: String,
    pub password: String,
    pub port: u16,
    pub max_connections: u32,
    pub statement_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub analysis_mode: AnalysisMode,
    pub debug: bool,
    /// How far back to load bars for each asset, in days.
    pub history_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = env::var("DB_HOST").context("DB_HOST is required")?;
        let name = env::var("DB_NAME").context("DB_NAME is required")?;
        let username = env::var("DB_USERNAME").context("DB_USERNAME is required")?;
        let password = env::var("DB_PASSWORD").context("DB_PASSWORD is required")?;

        let port = env::var("DB_PORT")
            .unwrap_or_else(|_| "5432".to_string())
            .parse::<u16>()
            .context("Failed to parse DB_PORT")?;

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .context("Failed to parse DB_MAX_CONNECTIONS")?;

        let statement_timeout_secs = env::var("DB_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .context("Failed to parse DB_TIMEOUT_SECONDS")?;

        let mode_str = env::var("ANALYSIS_MODE").unwrap_or_else(|_| "advanced".to_string());
        let analysis_mode = AnalysisMode::from_str(&mode_str)?;

        let debug = env::var("DEBUG")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let history_days = env::var("HISTORY_DAYS")
            .unwrap_or_else(|_| "180".to_string())
            .parse::<i64>()
            .context("Failed to parse HISTORY_DAYS")?;

        Ok(Config {
            db: DbConfig {
                host,
                name,
                username,
                password,
                port,
                max_connections,
                statement_timeout_secs,
            },
            analysis_mode,
            debug,
            history_days,
        })
    }
}
