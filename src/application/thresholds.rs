//! Adaptive thresholds: volatility-normalized decision levels derived from
//! indicator history instead of fixed constants.

use crate::application::stats;
use crate::domain::types::VolatilityRegime;
use std::collections::HashMap;

/// Converts a median absolute deviation to an equivalent standard deviation.
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Minimum non-missing samples before percentile thresholds are meaningful.
pub const MIN_PERCENTILE_SAMPLES: usize = 20;

/// Value at each named percentile over `values`. Returns an empty map when
/// fewer than [`MIN_PERCENTILE_SAMPLES`] samples are available.
pub fn percentile_thresholds(values: &[f64], percentiles: &[(&str, f64)]) -> HashMap<String, f64> {
    let mut thresholds = HashMap::new();
    if values.len() < MIN_PERCENTILE_SAMPLES {
        return thresholds;
    }
    for (name, pct) in percentiles {
        if let Some(v) = stats::percentile(values, *pct) {
            thresholds.insert((*name).to_string(), v);
        }
    }
    thresholds
}

/// ATR multipliers for the standard trading decisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtrMultipliers {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub significant_move: f64,
    pub breakout_confirmation: f64,
    pub trend_filter: f64,
}

impl Default for AtrMultipliers {
    fn default() -> Self {
        Self {
            stop_loss: 2.0,
            take_profit: 3.0,
            significant_move: 1.5,
            breakout_confirmation: 1.0,
            trend_filter: 0.5,
        }
    }
}

/// Absolute price thresholds: current ATR scaled by each multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtrThresholds {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub significant_move: f64,
    pub breakout_confirmation: f64,
    pub trend_filter: f64,
}

pub fn atr_thresholds(atr: f64, multipliers: &AtrMultipliers) -> AtrThresholds {
    AtrThresholds {
        stop_loss: atr * multipliers.stop_loss,
        take_profit: atr * multipliers.take_profit,
        significant_move: atr * multipliers.significant_move,
        breakout_confirmation: atr * multipliers.breakout_confirmation,
        trend_filter: atr * multipliers.trend_filter,
    }
}

/// Classify the volatility regime from where the current ATR sits in its
/// recent history: below the 25th percentile is low, above the 75th is high.
pub fn classify_volatility_regime(
    current_atr: f64,
    historical_atr: &[f64],
    lookback: usize,
) -> VolatilityRegime {
    if historical_atr.len() < lookback {
        return VolatilityRegime::Normal;
    }
    let recent = &historical_atr[historical_atr.len() - lookback..];
    let low = stats::percentile(recent, 25.0);
    let high = stats::percentile(recent, 75.0);
    match (low, high) {
        (Some(low), _) if current_atr < low => VolatilityRegime::Low,
        (_, Some(high)) if current_atr > high => VolatilityRegime::High,
        _ => VolatilityRegime::Normal,
    }
}

/// Multipliers reweighted for the regime: low volatility tightens stops and
/// breakout confirmation, high volatility widens them. The trend noise
/// filter is regime-independent.
pub fn regime_adjusted_multipliers(regime: VolatilityRegime) -> AtrMultipliers {
    let base = AtrMultipliers::default();
    match regime {
        VolatilityRegime::Low => AtrMultipliers {
            stop_loss: 1.5,
            take_profit: 2.0,
            breakout_confirmation: 0.75,
            significant_move: 1.0,
            ..base
        },
        VolatilityRegime::Normal => base,
        VolatilityRegime::High => AtrMultipliers {
            stop_loss: 3.0,
            take_profit: 4.0,
            breakout_confirmation: 1.5,
            significant_move: 2.0,
            ..base
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiSensitivity {
    Conservative,
    Normal,
    Aggressive,
}

impl RsiSensitivity {
    fn percentile_pair(&self) -> (f64, f64) {
        match self {
            RsiSensitivity::Conservative => (20.0, 80.0),
            RsiSensitivity::Normal => (15.0, 85.0),
            RsiSensitivity::Aggressive => (10.0, 90.0),
        }
    }
}

/// Adaptive (oversold, overbought) RSI thresholds from the historical RSI
/// distribution, clamped to sane bounds. Falls back to (30, 70) when history
/// is shorter than the lookback.
pub fn adaptive_rsi_thresholds(
    rsi_history: &[f64],
    lookback: usize,
    sensitivity: RsiSensitivity,
) -> (f64, f64) {
    if rsi_history.len() < lookback {
        return (30.0, 70.0);
    }
    let recent = &rsi_history[rsi_history.len() - lookback..];
    let (low_pct, high_pct) = sensitivity.percentile_pair();

    let oversold = stats::percentile(recent, low_pct).unwrap_or(30.0);
    let overbought = stats::percentile(recent, high_pct).unwrap_or(70.0);

    (oversold.clamp(20.0, 40.0), overbought.clamp(60.0, 80.0))
}

/// Robust volume spike thresholds.
#[derive(Debug, Clone)]
pub struct VolumeThresholds {
    pub baseline: f64,
    pub spike_threshold: f64,
    pub mad: f64,
    /// Percentile levels at 90 / 95 / 99 (empty below the sample minimum).
    pub percentiles: HashMap<String, f64>,
}

/// Median/MAD-based spike threshold over the trailing `lookback` volumes:
/// baseline + sensitivity * mad * 1.4826. Returns `None` with insufficient
/// history (an unbounded threshold would never fire anyway).
pub fn adaptive_volume_threshold(
    volumes: &[f64],
    lookback: usize,
    spike_sensitivity: f64,
) -> Option<VolumeThresholds> {
    if volumes.len() < lookback {
        return None;
    }
    let recent = &volumes[volumes.len() - lookback..];
    let baseline = stats::median(recent)?;
    let mad = stats::median_abs_deviation(recent)?;
    let spike_threshold = baseline + spike_sensitivity * mad * MAD_TO_SIGMA;

    let percentiles = percentile_thresholds(
        recent,
        &[
            ("high_volume", 90.0),
            ("very_high_volume", 95.0),
            ("extreme_volume", 99.0),
        ],
    );

    Some(VolumeThresholds {
        baseline,
        spike_threshold,
        mad,
        percentiles,
    })
}

/// Bollinger bandwidth percentile bands for squeeze/expansion detection over
/// the trailing `lookback` values. Empty when history is short.
pub fn adaptive_bandwidth_thresholds(
    bandwidth_history: &[f64],
    lookback: usize,
) -> HashMap<String, f64> {
    if bandwidth_history.len() < lookback {
        return HashMap::new();
    }
    let recent = &bandwidth_history[bandwidth_history.len() - lookback..];
    percentile_thresholds(
        recent,
        &[
            ("extreme_squeeze", 5.0),
            ("squeeze", 10.0),
            ("normal_low", 25.0),
            ("normal_high", 75.0),
            ("expansion", 90.0),
            ("extreme_expansion", 95.0),
        ],
    )
}

/// A price change expressed in ATR units, comparable across volatility
/// regimes. Zero ATR yields zero.
pub fn normalize_price_change(price_change: f64, atr: f64) -> f64 {
    if atr == 0.0 { 0.0 } else { price_change / atr }
}
