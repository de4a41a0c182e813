//! Signal detector: scans an asset's bar series for discrete pattern
//! events, then cleans the candidate pool.
//!
//! The pipeline is scan -> (indicator detectors in advanced mode) ->
//! temporal dedup -> weekly rate limit. The quality gate runs separately so
//! the orchestrator can apply it right before persistence, together with the
//! cross-run dedup against already-stored events.

mod advanced;
mod windows;

use crate::application::confidence::{self, ConfidenceInputs};
use crate::application::indicators::IndicatorSet;
use crate::application::thresholds;
use crate::domain::types::{AnalysisMode, Bar, SignalEvent, SignalType};
use chrono::{Datelike, Duration};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SignalConfig {
    /// Bars below which detection is a no-op.
    pub min_bars: usize,
    pub window_sizes: Vec<usize>,
    pub window_step: usize,

    pub pump_min_rise_percent: f64,
    pub dump_max_fall_percent: f64,
    pub pump_min_volume_ratio: f64,
    pub volume_spike_multiple: f64,
    pub min_volume_gate_ratio: f64,
    pub bottom_max_downtrend_percent: f64,
    pub bottom_min_recovery_percent: f64,
    pub parabolic_min_increasing: usize,
    pub parabolic_min_total_rise: f64,
    pub capitulation_max_downtrend_percent: f64,
    pub capitulation_max_drop_percent: f64,

    /// Bars required before indicator detectors engage.
    pub advanced_min_bars: usize,
    pub macd_keep_last: usize,
    pub breakout_keep_last: usize,
    pub rsi_keep_last: usize,
    pub rsi_threshold_lookback: usize,
    pub squeeze_lookback: usize,

    /// Same-type events closer than this many days collapse into one.
    pub dedup_days: i64,
    /// Per (signal_type, ISO week) emission cap.
    pub weekly_limit: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_bars: 14,
            window_sizes: vec![7, 14, 21],
            window_step: 3,
            pump_min_rise_percent: 50.0,
            dump_max_fall_percent: -30.0,
            pump_min_volume_ratio: 3.0,
            volume_spike_multiple: 5.0,
            min_volume_gate_ratio: 5.0,
            bottom_max_downtrend_percent: -15.0,
            bottom_min_recovery_percent: 10.0,
            parabolic_min_increasing: 3,
            parabolic_min_total_rise: 50.0,
            capitulation_max_downtrend_percent: -15.0,
            capitulation_max_drop_percent: -25.0,
            advanced_min_bars: 50,
            macd_keep_last: 3,
            breakout_keep_last: 2,
            rsi_keep_last: 2,
            rsi_threshold_lookback: 200,
            squeeze_lookback: 100,
            dedup_days: 3,
            weekly_limit: 2,
        }
    }
}

pub struct SignalDetector {
    mode: AnalysisMode,
    config: SignalConfig,
}

impl SignalDetector {
    pub fn new(mode: AnalysisMode) -> Self {
        Self {
            mode,
            config: SignalConfig::default(),
        }
    }

    pub fn with_config(mode: AnalysisMode, config: SignalConfig) -> Self {
        Self { mode, config }
    }

    /// Produce the cleaned candidate pool for one asset. The quality gate is
    /// NOT applied here; call [`SignalDetector::quality_gate`] before
    /// persisting.
    pub fn detect(
        &self,
        asset_id: i32,
        bars: &[Bar],
        indicators: Option<&IndicatorSet>,
    ) -> Vec<SignalEvent> {
        if bars.len() < self.config.min_bars {
            return Vec::new();
        }

        let mut candidates = windows::scan(asset_id, bars, &self.config);

        if self.mode == AnalysisMode::Advanced
            && let Some(indicators) = indicators
            && bars.len() >= self.config.advanced_min_bars
        {
            annotate_with_components(&mut candidates, bars, indicators);
            candidates.extend(advanced::detect(asset_id, bars, indicators, &self.config));
        }

        candidates.sort_by_key(|e| e.detected_at);
        let deduped = dedup_by_proximity(candidates, self.config.dedup_days);
        rate_limit_weekly(deduped, self.config.weekly_limit)
    }

    /// Second-level magnitude/volume filter applied before persistence.
    pub fn quality_gate(&self, events: Vec<SignalEvent>) -> Vec<SignalEvent> {
        events
            .into_iter()
            .filter(|e| self.passes_quality(e))
            .collect()
    }

    fn passes_quality(&self, event: &SignalEvent) -> bool {
        let meta_f64 = |key: &str| event.metadata.get(key).and_then(|v| v.as_f64());
        match event.signal_type {
            SignalType::PumpAndDump => {
                meta_f64("pump_percent").is_some_and(|p| p >= self.config.pump_min_rise_percent)
                    && meta_f64("dump_percent")
                        .is_some_and(|d| d <= self.config.dump_max_fall_percent)
                    && event
                        .volume_spike_ratio
                        .is_some_and(|r| r >= self.config.pump_min_volume_ratio)
            }
            SignalType::VolumeAnomaly => event
                .volume_spike_ratio
                .is_some_and(|r| r >= self.config.min_volume_gate_ratio),
            SignalType::BottomedOut => {
                meta_f64("downtrend_percent")
                    .is_some_and(|d| d <= self.config.bottom_max_downtrend_percent)
                    && meta_f64("recovery_percent")
                        .is_some_and(|r| r >= self.config.bottom_min_recovery_percent)
            }
            _ => true,
        }
    }

    /// Drop candidates that collide with already-persisted events of the
    /// same type (cross-run dedup).
    pub fn filter_against_persisted(
        &self,
        persisted: &[SignalEvent],
        candidates: Vec<SignalEvent>,
    ) -> Vec<SignalEvent> {
        let window = Duration::days(self.config.dedup_days);
        candidates
            .into_iter()
            .filter(|c| {
                !persisted.iter().any(|p| {
                    p.signal_type == c.signal_type && (c.detected_at - p.detected_at).abs() < window
                })
            })
            .collect()
    }
}

/// Window-pattern candidates keep their magnitude-based confidence, but when
/// kernel output exists every event also carries the confidence component
/// breakdown evaluated at its own bar.
fn annotate_with_components(events: &mut [SignalEvent], bars: &[Bar], indicators: &IndicatorSet) {
    for event in events.iter_mut() {
        let Some(index) = bars.iter().position(|b| b.timestamp == event.detected_at) else {
            continue;
        };
        let closes: Vec<f64> = bars[..=index].iter().map(|b| b.close).collect();
        let breakdown = confidence::calculate_confidence(&ConfidenceInputs {
            adx: indicators.adx[index],
            recent_price_pvalue: confidence::short_term_pvalue(&closes, 5),
            signal_type: Some(event.signal_type),
            ..Default::default()
        });
        if let Some(map) = event.metadata.as_object_mut() {
            map.insert(
                "confidence_components".to_string(),
                serde_json::to_value(breakdown).unwrap_or(serde_json::Value::Null),
            );
            // Volume spikes additionally carry the robust MAD-based spike
            // threshold over the trailing month for context.
            if event.signal_type == SignalType::VolumeAnomaly {
                let volumes: Vec<f64> = bars[..=index].iter().map(|b| b.volume).collect();
                if let Some(t) = thresholds::adaptive_volume_threshold(&volumes, 30, 3.0) {
                    map.insert("adaptive_baseline".to_string(), t.baseline.into());
                    map.insert(
                        "adaptive_spike_threshold".to_string(),
                        t.spike_threshold.into(),
                    );
                }
            }
        }
    }
}

/// Keep the earliest of any same-type cluster closer than `dedup_days`.
/// Expects the pool sorted by detected_at.
fn dedup_by_proximity(candidates: Vec<SignalEvent>, dedup_days: i64) -> Vec<SignalEvent> {
    let window = Duration::days(dedup_days);
    let mut kept: Vec<SignalEvent> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let duplicate = kept.iter().any(|existing| {
            existing.signal_type == candidate.signal_type
                && (candidate.detected_at - existing.detected_at).abs() < window
        });
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

/// At most `limit` events per (signal_type, ISO week). Expects the pool
/// sorted by detected_at so the earliest of each week win.
fn rate_limit_weekly(candidates: Vec<SignalEvent>, limit: usize) -> Vec<SignalEvent> {
    let mut counts: HashMap<(SignalType, i32, u32), usize> = HashMap::new();
    candidates
        .into_iter()
        .filter(|event| {
            let week = event.detected_at.iso_week();
            let key = (event.signal_type, week.year(), week.week());
            let count = counts.entry(key).or_insert(0);
            if *count < limit {
                *count += 1;
                true
            } else {
                false
            }
        })
        .collect()
}
