//! Sliding-window pattern detectors. Each scans a fixed-size window of bars
//! and emits at most one candidate event; the facade deduplicates the pool.

use super::SignalConfig;
use crate::application::stats;
use crate::domain::types::{Bar, SignalEvent, SignalType};
use serde_json::json;

/// Scan the series with every configured window size, stepping by
/// `window_step` bars, and accumulate all in-window candidates.
pub(super) fn scan(asset_id: i32, bars: &[Bar], cfg: &SignalConfig) -> Vec<SignalEvent> {
    let mut candidates = Vec::new();
    for &window_size in &cfg.window_sizes {
        if bars.len() < window_size {
            continue;
        }
        let mut start = 0;
        while start + window_size <= bars.len() {
            let window = &bars[start..start + window_size];
            candidates.extend(detect_in_window(asset_id, window, cfg));
            start += cfg.window_step;
        }
    }
    candidates
}

fn detect_in_window(asset_id: i32, window: &[Bar], cfg: &SignalConfig) -> Vec<SignalEvent> {
    let mut signals = Vec::new();
    if window.len() < 7 {
        return signals;
    }

    signals.extend(detect_pump_and_dump(asset_id, window, cfg));
    signals.extend(detect_volume_anomaly(asset_id, window, cfg));
    signals.extend(detect_bottomed_out(asset_id, window, cfg));
    signals.extend(detect_parabolic_rise(asset_id, window, cfg));
    signals.extend(detect_capitulation_drop(asset_id, window, cfg));
    signals
}

/// A sharp run-up in the first half on spiking volume followed by a collapse
/// in the second half. Detected at the start of the dump half.
fn detect_pump_and_dump(asset_id: i32, window: &[Bar], cfg: &SignalConfig) -> Option<SignalEvent> {
    if window.len() < 12 {
        return None;
    }
    let mid = window.len() / 2;
    let pump_half: Vec<f64> = window[..mid].iter().map(|b| b.close).collect();
    let dump_half: Vec<f64> = window[mid..].iter().map(|b| b.close).collect();

    let pump_start = pump_half.iter().copied().fold(f64::INFINITY, f64::min);
    let pump_peak = pump_half.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let dump_end = dump_half.iter().copied().fold(f64::INFINITY, f64::min);
    if pump_start <= 0.0 || pump_peak <= 0.0 {
        return None;
    }

    let pump_percent = (pump_peak - pump_start) / pump_start * 100.0;
    let dump_percent = (dump_end - pump_peak) / pump_peak * 100.0;
    if pump_percent <= cfg.pump_min_rise_percent || dump_percent >= cfg.dump_max_fall_percent {
        return None;
    }

    let pump_volumes: Vec<f64> = window[..mid].iter().map(|b| b.volume).collect();
    let avg_volume = stats::mean(&pump_volumes)?;
    let max_volume = pump_volumes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let volume_spike_ratio = if avg_volume > 0.0 { max_volume / avg_volume } else { 1.0 };
    if volume_spike_ratio < cfg.pump_min_volume_ratio {
        return None;
    }

    Some(SignalEvent {
        asset_id,
        signal_type: SignalType::PumpAndDump,
        detected_at: window[mid].timestamp,
        confidence: ((pump_percent + dump_percent.abs()) / 120.0).min(1.0),
        trigger_price: Some(pump_peak),
        volume_spike_ratio: Some(volume_spike_ratio),
        metadata: json!({
            "pump_percent": pump_percent,
            "dump_percent": dump_percent,
            "pump_start_price": pump_start,
            "pump_peak_price": pump_peak,
            "dump_end_price": dump_end,
            "volume_spike_ratio": volume_spike_ratio,
            "window_size_days": window.len(),
        }),
    })
}

/// The final bar's volume dwarfing the in-window baseline.
fn detect_volume_anomaly(asset_id: i32, window: &[Bar], cfg: &SignalConfig) -> Option<SignalEvent> {
    let volumes: Vec<f64> = window.iter().map(|b| b.volume).collect();
    let (baseline, spike) = volumes.split_at(volumes.len() - 1);
    let avg_volume = stats::mean(baseline)?;
    let spike_volume = spike[0];
    if avg_volume <= 0.0 || spike_volume <= avg_volume * cfg.volume_spike_multiple {
        return None;
    }

    let last = &window[window.len() - 1];
    Some(SignalEvent {
        asset_id,
        signal_type: SignalType::VolumeAnomaly,
        detected_at: last.timestamp,
        confidence: (spike_volume / (avg_volume * 8.0)).min(1.0),
        trigger_price: Some(last.close),
        volume_spike_ratio: Some(spike_volume / avg_volume),
        metadata: json!({
            "avg_volume": avg_volume,
            "spike_volume": spike_volume,
            "baseline_days": baseline.len(),
            "volume_increase_percent": (spike_volume - avg_volume) / avg_volume * 100.0,
        }),
    })
}

/// A pronounced first-half decline followed by a second-half recovery.
fn detect_bottomed_out(asset_id: i32, window: &[Bar], cfg: &SignalConfig) -> Option<SignalEvent> {
    if window.len() < 14 {
        return None;
    }
    let mid = window.len() / 2;
    let earlier = &window[..mid];
    let later = &window[mid..];

    let early_first = earlier[0].close;
    let early_last = earlier[earlier.len() - 1].close;
    let late_first = later[0].close;
    let late_last = later[later.len() - 1].close;
    if early_first <= 0.0 || late_first <= 0.0 {
        return None;
    }

    let downtrend_percent = (early_last - early_first) / early_first * 100.0;
    let recovery_percent = (late_last - late_first) / late_first * 100.0;
    if downtrend_percent >= cfg.bottom_max_downtrend_percent
        || recovery_percent <= cfg.bottom_min_recovery_percent
    {
        return None;
    }

    Some(SignalEvent {
        asset_id,
        signal_type: SignalType::BottomedOut,
        detected_at: window[window.len() - 1].timestamp,
        confidence: ((downtrend_percent.abs() + recovery_percent) / 40.0).min(1.0),
        trigger_price: Some(late_last),
        volume_spike_ratio: None,
        metadata: json!({
            "downtrend_percent": downtrend_percent,
            "recovery_percent": recovery_percent,
            "pattern_days": window.len(),
        }),
    })
}

/// Accelerating sequential gains adding up to a significant total rise,
/// evaluated over the trailing ten bars of the window.
fn detect_parabolic_rise(asset_id: i32, window: &[Bar], cfg: &SignalConfig) -> Option<SignalEvent> {
    if window.len() < 10 {
        return None;
    }
    let recent = &window[window.len() - 10..];
    let closes: Vec<f64> = recent.iter().map(|b| b.close).collect();

    let mut changes = Vec::with_capacity(closes.len() - 1);
    for pair in closes.windows(2) {
        if pair[0] <= 0.0 {
            return None;
        }
        changes.push((pair[1] - pair[0]) / pair[0] * 100.0);
    }

    let increasing = changes.windows(2).filter(|p| p[1] > p[0]).count();
    let total_rise: f64 = changes.iter().sum();
    if increasing < cfg.parabolic_min_increasing || total_rise <= cfg.parabolic_min_total_rise {
        return None;
    }

    let last = &recent[recent.len() - 1];
    Some(SignalEvent {
        asset_id,
        signal_type: SignalType::ParabolicRise,
        detected_at: last.timestamp,
        confidence: (total_rise / 100.0).min(1.0),
        trigger_price: Some(last.close),
        volume_spike_ratio: None,
        metadata: json!({
            "total_rise_percent": total_rise,
            "increasing_changes": increasing,
            "avg_daily_change": total_rise / changes.len() as f64,
        }),
    })
}

/// A sharp second-half drop after a first half already in decline.
fn detect_capitulation_drop(
    asset_id: i32,
    window: &[Bar],
    cfg: &SignalConfig,
) -> Option<SignalEvent> {
    if window.len() < 14 {
        return None;
    }
    let mid = window.len() / 2;
    let earlier = &window[..mid];
    let later = &window[mid..];

    let early_first = earlier[0].close;
    let early_last = earlier[earlier.len() - 1].close;
    let late_first = later[0].close;
    let late_last = later[later.len() - 1].close;
    if early_first <= 0.0 || late_first <= 0.0 {
        return None;
    }

    let downtrend_percent = (early_last - early_first) / early_first * 100.0;
    let drop_percent = (late_last - late_first) / late_first * 100.0;
    if downtrend_percent >= cfg.capitulation_max_downtrend_percent
        || drop_percent >= cfg.capitulation_max_drop_percent
    {
        return None;
    }

    Some(SignalEvent {
        asset_id,
        signal_type: SignalType::CapitulationDrop,
        detected_at: window[window.len() - 1].timestamp,
        confidence: ((downtrend_percent.abs() + drop_percent.abs()) / 100.0).min(1.0),
        trigger_price: Some(late_last),
        volume_spike_ratio: None,
        metadata: json!({
            "downtrend_percent": downtrend_percent,
            "drop_percent": drop_percent,
            "total_decline": downtrend_percent + drop_percent,
        }),
    })
}
