//! Repository Pattern Abstractions
//!
//! Traits for the persistence surfaces the analysis pipeline touches. The
//! numerical core never sees a connection; the orchestrator is handed these
//! abstractions and the Postgres implementations live in `infrastructure`.
//! In-memory implementations back the integration tests.

use crate::domain::types::{AnalysisRun, Asset, Bar, SignalEvent, TrendRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read access to the curated asset set.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// All active assets, ordered by rank ascending.
    async fn find_active(&self) -> Result<Vec<Asset>>;
}

/// Read access to the persisted bar series.
#[async_trait]
pub trait BarRepository: Send + Sync {
    /// Bars for one asset with timestamp >= `since`, ordered ascending.
    async fn find_since(&self, asset_id: i32, since: DateTime<Utc>) -> Result<Vec<Bar>>;
}

/// Write access for trend classifications.
#[async_trait]
pub trait TrendRepository: Send + Sync {
    /// Insert or replace on (asset_id, timeframe, start_time).
    async fn upsert(&self, record: &TrendRecord) -> Result<()>;
}

/// Access to the signal event stream.
#[async_trait]
pub trait SignalRepository: Send + Sync {
    async fn insert(&self, event: &SignalEvent) -> Result<()>;

    /// Events for one asset detected at or after `since`, any type.
    async fn find_since(&self, asset_id: i32, since: DateTime<Utc>) -> Result<Vec<SignalEvent>>;
}

/// Lifecycle of analysis run records.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Open a new run in `running` state and return its id.
    async fn open(&self, run_type: &str) -> Result<i64>;

    /// Terminate the run as completed with the processed count.
    async fn complete(&self, run_id: i64, records_processed: i64) -> Result<()>;

    /// Terminate the run as failed with a reason.
    async fn fail(&self, run_id: i64, error_message: &str) -> Result<()>;

    /// Look up a run record by id.
    async fn find(&self, run_id: i64) -> Result<Option<AnalysisRun>>;
}
