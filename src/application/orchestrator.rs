//! Analysis orchestrator: drives one full run over the active asset set.
//!
//! Per-asset failures are logged and counted, never fatal; the run record
//! transitions running -> completed/failed exactly once. Within one asset
//! all trend upserts land before any signal insert so a concurrent reader
//! sees a consistent snapshot.

use crate::application::indicators::{IndicatorConfig, IndicatorSet};
use crate::application::signals::SignalDetector;
use crate::application::trend::TrendAnalyzer;
use crate::domain::repositories::{
    AssetRepository, BarRepository, RunRepository, SignalRepository, TrendRepository,
};
use crate::domain::types::{AnalysisMode, Asset, Timeframe};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const RUN_TYPE: &str = "trend_analysis";

/// Accounting for one completed run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub trends_stored: usize,
    pub signals_stored: usize,
    pub signals_by_type: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct AssetOutcome {
    trends: usize,
    signals: usize,
    by_type: HashMap<String, usize>,
}

pub struct AnalysisOrchestrator {
    assets: Arc<dyn AssetRepository>,
    bars: Arc<dyn BarRepository>,
    trends: Arc<dyn TrendRepository>,
    signals: Arc<dyn SignalRepository>,
    runs: Arc<dyn RunRepository>,
    analyzer: TrendAnalyzer,
    detector: SignalDetector,
    indicator_config: IndicatorConfig,
    mode: AnalysisMode,
    history_days: i64,
    min_bars: usize,
    dedup_days: i64,
}

impl AnalysisOrchestrator {
    pub fn new(
        assets: Arc<dyn AssetRepository>,
        bars: Arc<dyn BarRepository>,
        trends: Arc<dyn TrendRepository>,
        signals: Arc<dyn SignalRepository>,
        runs: Arc<dyn RunRepository>,
        mode: AnalysisMode,
        history_days: i64,
    ) -> Self {
        Self {
            assets,
            bars,
            trends,
            signals,
            runs,
            analyzer: TrendAnalyzer::new(mode),
            detector: SignalDetector::new(mode),
            indicator_config: IndicatorConfig::default(),
            mode,
            history_days,
            min_bars: 14,
            dedup_days: 3,
        }
    }

    /// Execute a full analysis pass. Safe to re-run: trend output is
    /// upserted on its key and signal output dedups against the store.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary> {
        let run_id = self
            .runs
            .open(RUN_TYPE)
            .await
            .context("Failed to open analysis run record")?;
        info!(run_id, mode = ?self.mode, "analysis run started");

        let assets = match self.assets.find_active().await {
            Ok(assets) => assets,
            Err(e) => {
                self.runs
                    .fail(run_id, &format!("failed to load assets: {e}"))
                    .await
                    .ok();
                return Err(e).context("Failed to load active assets");
            }
        };
        info!(count = assets.len(), "active assets loaded");

        let mut summary = RunSummary {
            run_id,
            ..Default::default()
        };

        for asset in &assets {
            if cancel.is_cancelled() {
                self.runs.fail(run_id, "cancelled").await.ok();
                anyhow::bail!("analysis run {run_id} cancelled");
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    self.runs.fail(run_id, "cancelled").await.ok();
                    anyhow::bail!("analysis run {run_id} cancelled");
                }
                outcome = self.process_asset(asset) => outcome,
            };

            match outcome {
                Ok(Some(outcome)) => {
                    summary.processed += 1;
                    summary.trends_stored += outcome.trends;
                    summary.signals_stored += outcome.signals;
                    for (signal_type, count) in outcome.by_type {
                        *summary.signals_by_type.entry(signal_type).or_insert(0) += count;
                    }
                }
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    error!(asset = %asset.symbol, error = %format!("{e:#}"), "asset analysis failed");
                    summary.errors += 1;
                }
            }
        }

        self.runs
            .complete(run_id, summary.processed as i64)
            .await
            .context("Failed to finalize analysis run record")?;

        info!(
            run_id,
            processed = summary.processed,
            skipped = summary.skipped,
            errors = summary.errors,
            trends = summary.trends_stored,
            signals = summary.signals_stored,
            "analysis run completed"
        );
        Ok(summary)
    }

    /// Analyze one asset. `Ok(None)` marks a skip (bars unreadable or too
    /// few); `Err` is a per-asset write failure the caller counts and moves
    /// past.
    async fn process_asset(&self, asset: &Asset) -> Result<Option<AssetOutcome>> {
        let now = Utc::now();
        let since = now - Duration::days(self.history_days);
        // A failed bar read skips the asset; only write failures count as
        // per-asset errors.
        let bars = match self.bars.find_since(asset.id, since).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(
                    asset = %asset.symbol,
                    error = %format!("{e:#}"),
                    "skipping asset: failed to load bars"
                );
                return Ok(None);
            }
        };

        if bars.len() < self.min_bars {
            warn!(
                asset = %asset.symbol,
                bars = bars.len(),
                "skipping asset: insufficient history"
            );
            return Ok(None);
        }

        let indicators = (self.mode == AnalysisMode::Advanced
            && bars.len() >= self.indicator_config.sma_fast_period)
            .then(|| IndicatorSet::compute(&bars, &self.indicator_config));

        let mut outcome = AssetOutcome::default();

        // Trend upserts complete before any signal insert for this asset.
        for timeframe in Timeframe::ALL {
            if let Some(record) =
                self.analyzer
                    .analyze(asset.id, &bars, indicators.as_ref(), timeframe, now)
            {
                self.trends
                    .upsert(&record)
                    .await
                    .with_context(|| format!("Failed to upsert trend for {}", asset.symbol))?;
                outcome.trends += 1;
            }
        }

        let pool = self.detector.detect(asset.id, &bars, indicators.as_ref());
        let detected = pool.len();
        let gated = self.detector.quality_gate(pool);

        let survivors = if gated.is_empty() {
            gated
        } else {
            // Consult the store back past the earliest candidate so re-runs
            // over the same windows cannot re-emit persisted patterns.
            let earliest = gated.iter().map(|e| e.detected_at).min().unwrap_or(now);
            let persisted = self
                .signals
                .find_since(asset.id, earliest - Duration::days(self.dedup_days))
                .await
                .with_context(|| format!("Failed to load recent signals for {}", asset.symbol))?;
            self.detector.filter_against_persisted(&persisted, gated)
        };

        for event in &survivors {
            self.signals
                .insert(event)
                .await
                .with_context(|| format!("Failed to insert signal for {}", asset.symbol))?;
            *outcome
                .by_type
                .entry(event.signal_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        outcome.signals = survivors.len();

        info!(
            asset = %asset.symbol,
            trends = outcome.trends,
            detected,
            stored = outcome.signals,
            "asset analyzed"
        );
        Ok(Some(outcome))
    }
}
