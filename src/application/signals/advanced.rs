//! Indicator-driven detectors: crossover and reversal events read off the
//! kernel's series. Each family bounds its output to the most recent
//! occurrences so a long history cannot flood the pool.

use super::SignalConfig;
use crate::application::confidence::{self, ConfidenceInputs};
use crate::application::indicators::{IndicatorSet, Series};
use crate::application::thresholds::{self, RsiSensitivity};
use crate::domain::types::{Bar, SignalEvent, SignalType};
use serde_json::json;

pub(super) fn detect(
    asset_id: i32,
    bars: &[Bar],
    indicators: &IndicatorSet,
    cfg: &SignalConfig,
) -> Vec<SignalEvent> {
    let mut signals = Vec::new();
    signals.extend(macd_crossovers(asset_id, bars, indicators, cfg));
    signals.extend(ma_crossovers(asset_id, bars, indicators));
    signals.extend(bollinger_breakouts(asset_id, bars, indicators, cfg));
    signals.extend(rsi_reversals(asset_id, bars, indicators, cfg));
    signals
}

/// Indices where `fast` crosses `slow`, split by direction. Only bars where
/// both series are defined participate.
fn crossover_indices(fast: &Series, slow: &Series) -> (Vec<usize>, Vec<usize>) {
    let mut up = Vec::new();
    let mut down = Vec::new();
    let mut prev_above: Option<bool> = None;
    for i in 0..fast.len() {
        let (Some(f), Some(s)) = (fast[i], slow[i]) else {
            continue;
        };
        let above = f > s;
        if let Some(was_above) = prev_above {
            if !was_above && above {
                up.push(i);
            } else if was_above && !above {
                down.push(i);
            }
        }
        prev_above = Some(above);
    }
    (up, down)
}

fn score_at(
    bars: &[Bar],
    indicators: &IndicatorSet,
    index: usize,
    inputs_base: ConfidenceInputs,
) -> confidence::ConfidenceBreakdown {
    let closes: Vec<f64> = bars[..=index].iter().map(|b| b.close).collect();
    confidence::calculate_confidence(&ConfidenceInputs {
        adx: indicators.adx[index],
        recent_price_pvalue: confidence::short_term_pvalue(&closes, 5),
        ..inputs_base
    })
}

/// MACD line / signal line sign changes, bounded to the last three per
/// polarity. The histogram percentile at the cross feeds the momentum
/// factor.
fn macd_crossovers(
    asset_id: i32,
    bars: &[Bar],
    indicators: &IndicatorSet,
    cfg: &SignalConfig,
) -> Vec<SignalEvent> {
    let histogram_history: Vec<f64> = indicators.macd.histogram.iter().flatten().copied().collect();
    let (bullish, bearish) = crossover_indices(&indicators.macd.macd_line, &indicators.macd.signal_line);

    let mut signals = Vec::new();
    for (signal_type, indices) in [
        (SignalType::MacdBullish, bullish),
        (SignalType::MacdBearish, bearish),
    ] {
        let keep = indices.len().saturating_sub(cfg.macd_keep_last);
        for &i in &indices[keep..] {
            let histogram_value = indicators.macd.histogram[i].unwrap_or(0.0);
            let histogram_percentile =
                confidence::histogram_percentile(histogram_value, &histogram_history);
            let breakdown = score_at(
                bars,
                indicators,
                i,
                ConfidenceInputs {
                    macd_histogram_percentile: histogram_percentile,
                    signal_type: Some(signal_type),
                    ..Default::default()
                },
            );
            signals.push(SignalEvent {
                asset_id,
                signal_type,
                detected_at: bars[i].timestamp,
                confidence: breakdown.overall_confidence,
                trigger_price: Some(bars[i].close),
                volume_spike_ratio: None,
                metadata: json!({
                    "histogram_value": histogram_value,
                    "histogram_percentile": histogram_percentile,
                    "confidence_components": breakdown,
                    "analysis_mode": "advanced",
                }),
            });
        }
    }
    signals
}

/// SMA(50) / SMA(200) golden and death crosses; only the most recent of each
/// polarity is emitted.
fn ma_crossovers(asset_id: i32, bars: &[Bar], indicators: &IndicatorSet) -> Vec<SignalEvent> {
    let (golden, death) = crossover_indices(&indicators.sma_fast, &indicators.sma_slow);

    let mut signals = Vec::new();
    for (signal_type, indices) in [
        (SignalType::GoldenCross, golden),
        (SignalType::DeathCross, death),
    ] {
        if let Some(&i) = indices.last() {
            let breakdown = score_at(
                bars,
                indicators,
                i,
                ConfidenceInputs {
                    signal_type: Some(signal_type),
                    ..Default::default()
                },
            );
            signals.push(SignalEvent {
                asset_id,
                signal_type,
                detected_at: bars[i].timestamp,
                confidence: breakdown.overall_confidence,
                trigger_price: Some(bars[i].close),
                volume_spike_ratio: None,
                metadata: json!({
                    "sma_50": indicators.sma_fast[i],
                    "sma_200": indicators.sma_slow[i],
                    "confidence_components": breakdown,
                    "analysis_mode": "advanced",
                }),
            });
        }
    }
    signals
}

/// End-of-squeeze events: bandwidth leaves the trailing 10th-percentile band
/// it had been squeezed under. Bounded to the last two.
fn bollinger_breakouts(
    asset_id: i32,
    bars: &[Bar],
    indicators: &IndicatorSet,
    cfg: &SignalConfig,
) -> Vec<SignalEvent> {
    let bandwidth = &indicators.bollinger.bandwidth;
    let bandwidth_history: Vec<f64> = bandwidth.iter().flatten().copied().collect();
    let squeeze_bands =
        thresholds::adaptive_bandwidth_thresholds(&bandwidth_history, cfg.squeeze_lookback);

    // Trailing squeeze threshold per bar: the 10th percentile of up to the
    // last 100 defined bandwidth values, once at least 20 exist.
    let mut threshold: Series = vec![None; bandwidth.len()];
    let mut defined: Vec<f64> = Vec::new();
    for i in 0..bandwidth.len() {
        if let Some(bw) = bandwidth[i] {
            defined.push(bw);
            if defined.len() >= 20 {
                let start = defined.len().saturating_sub(cfg.squeeze_lookback);
                threshold[i] = crate::application::stats::percentile(&defined[start..], 10.0);
            }
        }
    }

    let mut breakout_indices = Vec::new();
    for i in 1..bandwidth.len() {
        if let (Some(prev_bw), Some(prev_thr), Some(bw), Some(thr)) =
            (bandwidth[i - 1], threshold[i - 1], bandwidth[i], threshold[i])
            && prev_bw <= prev_thr
            && bw > thr
        {
            breakout_indices.push(i);
        }
    }

    let keep = breakout_indices.len().saturating_sub(cfg.breakout_keep_last);
    let mut signals = Vec::new();
    for &i in &breakout_indices[keep..] {
        let bw = indicators.bollinger.bandwidth[i].unwrap_or(0.0);
        let bandwidth_percentile = confidence::histogram_percentile(bw, &bandwidth_history);
        let breakdown = score_at(
            bars,
            indicators,
            i,
            ConfidenceInputs {
                bollinger_bandwidth_percentile: bandwidth_percentile,
                signal_type: Some(SignalType::BollingerBreakout),
                ..Default::default()
            },
        );
        signals.push(SignalEvent {
            asset_id,
            signal_type: SignalType::BollingerBreakout,
            detected_at: bars[i].timestamp,
            confidence: breakdown.overall_confidence,
            trigger_price: Some(bars[i].close),
            volume_spike_ratio: None,
            metadata: json!({
                "bandwidth": bw,
                "bandwidth_percentile": bandwidth_percentile,
                "squeeze_threshold": squeeze_bands.get("squeeze").copied(),
                "confidence_components": breakdown,
                "analysis_mode": "advanced",
            }),
        });
    }
    signals
}

/// RSI re-entry edges against the adaptive thresholds: crossing back up
/// through oversold, or back down through overbought. Bounded to the last
/// two per polarity.
fn rsi_reversals(
    asset_id: i32,
    bars: &[Bar],
    indicators: &IndicatorSet,
    cfg: &SignalConfig,
) -> Vec<SignalEvent> {
    let rsi_history: Vec<f64> = indicators.rsi.iter().flatten().copied().collect();
    let (oversold, overbought) = thresholds::adaptive_rsi_thresholds(
        &rsi_history,
        cfg.rsi_threshold_lookback,
        RsiSensitivity::Normal,
    );

    let mut oversold_exits = Vec::new();
    let mut overbought_exits = Vec::new();
    let mut prev: Option<(usize, f64)> = None;
    for i in 0..indicators.rsi.len() {
        let Some(value) = indicators.rsi[i] else { continue };
        if let Some((_, prev_value)) = prev {
            if prev_value < oversold && value >= oversold {
                oversold_exits.push(i);
            } else if prev_value > overbought && value <= overbought {
                overbought_exits.push(i);
            }
        }
        prev = Some((i, value));
    }

    let mut signals = Vec::new();
    for (signal_type, indices) in [
        (SignalType::RsiOversold, oversold_exits),
        (SignalType::RsiOverbought, overbought_exits),
    ] {
        let keep = indices.len().saturating_sub(cfg.rsi_keep_last);
        for &i in &indices[keep..] {
            let breakdown = score_at(
                bars,
                indicators,
                i,
                ConfidenceInputs {
                    signal_type: Some(signal_type),
                    ..Default::default()
                },
            );
            signals.push(SignalEvent {
                asset_id,
                signal_type,
                detected_at: bars[i].timestamp,
                confidence: breakdown.overall_confidence,
                trigger_price: Some(bars[i].close),
                volume_spike_ratio: None,
                metadata: json!({
                    "rsi_value": indicators.rsi[i],
                    "oversold_threshold": oversold,
                    "overbought_threshold": overbought,
                    "confidence_components": breakdown,
                    "analysis_mode": "advanced",
                }),
            });
        }
    }
    signals
}
