//! End-to-end orchestrator runs over in-memory repositories: idempotent
//! trend upserts, cross-run signal dedup, skip/error accounting and
//! cancellation, all without a database.

use anyhow::Result;
use async_trait::async_trait;
use chartpulse::application::orchestrator::AnalysisOrchestrator;
use chartpulse::domain::repositories::{
    AssetRepository, BarRepository, RunRepository, SignalRepository, TrendRepository,
};
use chartpulse::domain::types::{
    AnalysisMode, AnalysisRun, Asset, Bar, RunStatus, SignalEvent, TrendRecord,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

// --- Mocks ---

struct InMemoryAssets {
    assets: Vec<Asset>,
}

#[async_trait]
impl AssetRepository for InMemoryAssets {
    async fn find_active(&self) -> Result<Vec<Asset>> {
        Ok(self.assets.clone())
    }
}

#[derive(Default)]
struct InMemoryBars {
    bars: HashMap<i32, Vec<Bar>>,
    fail_for: Option<i32>,
}

#[async_trait]
impl BarRepository for InMemoryBars {
    async fn find_since(&self, asset_id: i32, since: DateTime<Utc>) -> Result<Vec<Bar>> {
        if self.fail_for == Some(asset_id) {
            anyhow::bail!("simulated connection loss");
        }
        Ok(self
            .bars
            .get(&asset_id)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct InMemoryTrends {
    rows: Mutex<HashMap<(i32, String, DateTime<Utc>), TrendRecord>>,
    fail_for: Option<i32>,
}

impl InMemoryTrends {
    fn snapshot(&self) -> HashMap<(i32, String, DateTime<Utc>), TrendRecord> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrendRepository for InMemoryTrends {
    async fn upsert(&self, record: &TrendRecord) -> Result<()> {
        if self.fail_for == Some(record.asset_id) {
            anyhow::bail!("simulated write failure");
        }
        let key = (
            record.asset_id,
            record.timeframe.as_str().to_string(),
            record.start_time,
        );
        self.rows.lock().unwrap().insert(key, record.clone());
        Ok(())
    }
}

#[derive(Default)]
struct InMemorySignals {
    rows: Mutex<Vec<SignalEvent>>,
}

impl InMemorySignals {
    fn snapshot(&self) -> Vec<SignalEvent> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalRepository for InMemorySignals {
    async fn insert(&self, event: &SignalEvent) -> Result<()> {
        self.rows.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn find_since(&self, asset_id: i32, since: DateTime<Utc>) -> Result<Vec<SignalEvent>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.asset_id == asset_id && e.detected_at >= since)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct InMemoryRuns {
    rows: Mutex<Vec<AnalysisRun>>,
}

impl InMemoryRuns {
    fn snapshot(&self) -> Vec<AnalysisRun> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunRepository for InMemoryRuns {
    async fn open(&self, run_type: &str) -> Result<i64> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(AnalysisRun {
            id,
            run_type: run_type.to_string(),
            status: RunStatus::Running,
            records_processed: 0,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        });
        Ok(id)
    }

    async fn complete(&self, run_id: i64, records_processed: i64) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = &mut rows[(run_id - 1) as usize];
        row.status = RunStatus::Completed;
        row.records_processed = records_processed;
        row.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, run_id: i64, error_message: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = &mut rows[(run_id - 1) as usize];
        row.status = RunStatus::Failed;
        row.error_message = Some(error_message.to_string());
        row.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn find(&self, run_id: i64) -> Result<Option<AnalysisRun>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get((run_id - 1) as usize)
            .cloned())
    }
}

// --- Fixtures ---

fn asset(id: i32, symbol: &str) -> Asset {
    Asset {
        id,
        symbol: symbol.to_string(),
        name: symbol.to_string(),
        coingecko_id: None,
        cmc_id: None,
        rank: Some(id),
        is_active: true,
    }
}

fn daily_bars(asset_id: i32, closes: &[f64], volumes: &[f64], now: DateTime<Utc>) -> Vec<Bar> {
    let n = closes.len();
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| Bar {
            asset_id,
            timestamp: now - Duration::days((n - 1 - i) as i64),
            close,
            volume,
            open: None,
            high: None,
            low: None,
            market_cap: None,
            percent_change_1h: None,
            percent_change_24h: None,
            percent_change_7d: None,
        })
        .collect()
}

struct Harness {
    assets: Arc<InMemoryAssets>,
    bars: Arc<InMemoryBars>,
    trends: Arc<InMemoryTrends>,
    signals: Arc<InMemorySignals>,
    runs: Arc<InMemoryRuns>,
}

impl Harness {
    fn orchestrator(&self, mode: AnalysisMode) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(
            self.assets.clone(),
            self.bars.clone(),
            self.trends.clone(),
            self.signals.clone(),
            self.runs.clone(),
            mode,
            180,
        )
    }
}

fn harness(assets: Vec<Asset>, bars: InMemoryBars) -> Harness {
    Harness {
        assets: Arc::new(InMemoryAssets { assets }),
        bars: Arc::new(bars),
        trends: Arc::new(InMemoryTrends::default()),
        signals: Arc::new(InMemorySignals::default()),
        runs: Arc::new(InMemoryRuns::default()),
    }
}

// --- Tests ---

#[tokio::test]
async fn rerunning_on_unchanged_bars_is_idempotent() {
    let now = Utc::now();
    // Asset 1: 60 days of drifting prices with one terminal volume spike.
    let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
    let mut volumes = vec![100.0; 60];
    volumes[59] = 5000.0;
    // Asset 2: too little history, must be skipped.
    let short_closes: Vec<f64> = (0..10).map(|i| 50.0 + i as f64).collect();

    let mut bars = InMemoryBars::default();
    bars.bars.insert(1, daily_bars(1, &closes, &volumes, now));
    bars.bars
        .insert(2, daily_bars(2, &short_closes, &vec![10.0; 10], now));

    let h = harness(vec![asset(1, "BTC"), asset(2, "DUST")], bars);
    let orchestrator = h.orchestrator(AnalysisMode::Legacy);

    let first = orchestrator.run(CancellationToken::new()).await.unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(first.skipped, 1);
    assert_eq!(first.errors, 0);
    assert_eq!(first.trends_stored, 3); // 7d / 14d / 30d

    let trends_after_first = h.trends.snapshot();
    assert_eq!(trends_after_first.len(), 3);
    let signals_after_first = h.signals.snapshot();
    assert_eq!(signals_after_first.len(), 1);
    assert_eq!(signals_after_first[0].signal_type.as_str(), "volume_anomaly");

    let second = orchestrator.run(CancellationToken::new()).await.unwrap();
    assert_eq!(second.processed, 1);

    // Same keys, same classifications; no duplicate signal events.
    let trends_after_second = h.trends.snapshot();
    assert_eq!(trends_after_second.len(), 3);
    for (key, record) in &trends_after_first {
        let rerun = &trends_after_second[key];
        assert_eq!(rerun.trend_type, record.trend_type);
        assert_eq!(rerun.price_change_percent, record.price_change_percent);
        assert_eq!(rerun.confidence, record.confidence);
        assert_eq!(rerun.metadata, record.metadata);
    }
    assert_eq!(h.signals.snapshot().len(), 1);

    let runs = h.runs.snapshot();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Completed));
    assert!(runs.iter().all(|r| r.records_processed == 1));
}

#[tokio::test]
async fn emitted_records_respect_universal_invariants() {
    let now = Utc::now();
    // A volatile shape: collapse then sharp recovery over 90 days.
    let closes: Vec<f64> = (0..90)
        .map(|i| {
            if i < 45 {
                200.0 - i as f64 * 2.0
            } else {
                110.0 + (i - 45) as f64 * 3.0
            }
        })
        .collect();
    let mut volumes = vec![500.0; 90];
    volumes[88] = 20000.0;

    let mut bars = InMemoryBars::default();
    bars.bars.insert(7, daily_bars(7, &closes, &volumes, now));

    let h = harness(vec![asset(7, "VOLA")], bars);
    let summary = h
        .orchestrator(AnalysisMode::Legacy)
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.processed, 1);

    for record in h.trends.snapshot().values() {
        assert!((0.0..=1.0).contains(&record.confidence));
        assert!(["7d", "14d", "30d"].contains(&record.timeframe.as_str()));
        assert!(["uptrend", "downtrend", "sideways"].contains(&record.trend_type.as_str()));
    }
    let signals = h.signals.snapshot();
    for event in &signals {
        assert!((0.0..=1.0).contains(&event.confidence));
    }
    for (i, a) in signals.iter().enumerate() {
        for b in signals.iter().skip(i + 1) {
            if a.signal_type == b.signal_type {
                assert!((b.detected_at - a.detected_at).abs() >= Duration::days(3));
            }
        }
    }
}

#[tokio::test]
async fn bar_read_failure_skips_the_asset() {
    let now = Utc::now();
    let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();

    let mut bars = InMemoryBars {
        fail_for: Some(1),
        ..Default::default()
    };
    bars.bars.insert(2, daily_bars(2, &closes, &vec![100.0; 40], now));

    let h = harness(vec![asset(1, "BAD"), asset(2, "GOOD")], bars);
    let summary = h
        .orchestrator(AnalysisMode::Legacy)
        .run(CancellationToken::new())
        .await
        .unwrap();

    // An unreadable bar series is a skip, not an error; the run carries on.
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.processed, 1);
    assert!(summary.trends_stored > 0);

    let runs = h.runs.snapshot();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].records_processed, 1);
}

#[tokio::test]
async fn write_failure_counts_as_error_and_continues() {
    let now = Utc::now();
    let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();

    let mut bars = InMemoryBars::default();
    bars.bars.insert(1, daily_bars(1, &closes, &vec![100.0; 40], now));
    bars.bars.insert(2, daily_bars(2, &closes, &vec![100.0; 40], now));

    let h = Harness {
        assets: Arc::new(InMemoryAssets {
            assets: vec![asset(1, "BAD"), asset(2, "GOOD")],
        }),
        bars: Arc::new(bars),
        trends: Arc::new(InMemoryTrends {
            fail_for: Some(1),
            ..Default::default()
        }),
        signals: Arc::new(InMemorySignals::default()),
        runs: Arc::new(InMemoryRuns::default()),
    };
    let summary = h
        .orchestrator(AnalysisMode::Legacy)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.processed, 1);
    // Only the healthy asset's trends landed.
    assert!(h.trends.snapshot().keys().all(|(id, _, _)| *id == 2));

    let runs = h.runs.snapshot();
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].records_processed, 1);
}

#[tokio::test]
async fn cancellation_marks_the_run_failed() {
    let now = Utc::now();
    let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
    let mut bars = InMemoryBars::default();
    bars.bars.insert(1, daily_bars(1, &closes, &vec![100.0; 40], now));

    let h = harness(vec![asset(1, "BTC")], bars);
    let orchestrator = h.orchestrator(AnalysisMode::Legacy);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = orchestrator.run(cancel).await;
    assert!(result.is_err());

    let runs = h.runs.snapshot();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].error_message.as_deref(), Some("cancelled"));
    assert!(h.trends.snapshot().is_empty());
    assert!(h.signals.snapshot().is_empty());
}

#[tokio::test]
async fn advanced_mode_runs_end_to_end_with_indicator_metadata() {
    let now = Utc::now();
    // 120 bars: enough for the indicator kernel to engage.
    let closes: Vec<f64> = (0..120).map(|i| 100.0 + i as f64 * 0.8).collect();
    let mut bars = InMemoryBars::default();
    bars.bars.insert(1, daily_bars(1, &closes, &vec![100.0; 120], now));

    let h = harness(vec![asset(1, "BTC")], bars);
    let summary = h
        .orchestrator(AnalysisMode::Advanced)
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.trends_stored, 3);

    for record in h.trends.snapshot().values() {
        assert_eq!(record.metadata["analysis_mode"], "advanced");
        assert!(record.metadata["confidence_components"]["overall_confidence"].is_number());
        // Close-only bars force the degraded ATR path.
        assert_eq!(record.metadata["atr_degraded"], true);
        assert_eq!(record.trend_type.as_str(), "uptrend");
    }
}
