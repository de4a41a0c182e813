//! Multi-factor confidence model. Four weighted components, each mapped to
//! [0, 1], combined linearly and then nudged by signal-specific adjustments.
//! Missing inputs score a neutral 0.5 rather than dragging the result down.

use crate::application::stats;
use crate::domain::types::SignalType;
use serde::Serialize;

const WEIGHT_TREND_STRENGTH: f64 = 0.40;
const WEIGHT_MOMENTUM: f64 = 0.30;
const WEIGHT_VOLATILITY: f64 = 0.20;
const WEIGHT_NOISE: f64 = 0.10;

/// Raw indicator state feeding the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceInputs {
    pub adx: Option<f64>,
    pub macd_histogram_percentile: Option<f64>,
    pub bollinger_bandwidth_percentile: Option<f64>,
    pub recent_price_pvalue: Option<f64>,
    /// Signal context for volatility scoring and post-adjustments; `None`
    /// for trend classifications.
    pub signal_type: Option<SignalType>,
}

/// Component scores plus the weighted, adjusted, clamped overall value.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConfidenceBreakdown {
    pub trend_strength: f64,
    pub momentum_confirmation: f64,
    pub volatility_context: f64,
    pub statistical_noise: f64,
    pub overall_confidence: f64,
}

pub fn calculate_confidence(inputs: &ConfidenceInputs) -> ConfidenceBreakdown {
    let trend_strength = trend_strength_score(inputs.adx);
    let momentum_confirmation = momentum_score(inputs.macd_histogram_percentile);
    let volatility_context =
        volatility_score(inputs.bollinger_bandwidth_percentile, inputs.signal_type);
    let statistical_noise = noise_score(inputs.recent_price_pvalue);

    let mut overall = WEIGHT_TREND_STRENGTH * trend_strength
        + WEIGHT_MOMENTUM * momentum_confirmation
        + WEIGHT_VOLATILITY * volatility_context
        + WEIGHT_NOISE * statistical_noise;

    if let Some(signal_type) = inputs.signal_type {
        overall = apply_signal_adjustments(overall, signal_type, trend_strength, momentum_confirmation);
    }

    ConfidenceBreakdown {
        trend_strength,
        momentum_confirmation,
        volatility_context,
        statistical_noise,
        overall_confidence: overall.clamp(0.0, 1.0),
    }
}

/// ADX-based trend strength: dead below 20, saturating above 40.
fn trend_strength_score(adx: Option<f64>) -> f64 {
    match adx {
        None => 0.5,
        Some(adx) if adx < 20.0 => 0.0,
        Some(adx) if adx < 25.0 => 0.25,
        Some(adx) if adx < 40.0 => 0.50 + (adx - 25.0) / 30.0,
        Some(_) => 1.0,
    }
}

/// MACD histogram extremity: the further from the 50th percentile, the
/// stronger the momentum confirmation.
fn momentum_score(histogram_percentile: Option<f64>) -> f64 {
    match histogram_percentile {
        None => 0.5,
        Some(p) if !(20.0..=80.0).contains(&p) => 0.9,
        Some(p) if !(30.0..=70.0).contains(&p) => 0.7,
        Some(p) if !(40.0..=60.0).contains(&p) => 0.5,
        Some(_) => 0.3,
    }
}

/// Bandwidth context. Breakout signals prefer a tight squeeze; everything
/// else prefers mid-range volatility.
fn volatility_score(bandwidth_percentile: Option<f64>, signal_type: Option<SignalType>) -> f64 {
    let Some(p) = bandwidth_percentile else {
        return 0.5;
    };
    if signal_type.is_some_and(|s| s.is_breakout()) {
        if p < 10.0 {
            1.0
        } else if p < 25.0 {
            0.8
        } else if p < 50.0 {
            0.5
        } else {
            0.3
        }
    } else if (30.0..=70.0).contains(&p) {
        0.8
    } else if (20.0..=80.0).contains(&p) {
        0.6
    } else {
        0.4
    }
}

/// Short-term regression significance as a noise filter.
fn noise_score(p_value: Option<f64>) -> f64 {
    match p_value {
        None => 0.5,
        Some(p) if p < 0.01 => 1.0,
        Some(p) if p < 0.05 => 0.8,
        Some(p) if p < 0.10 => 0.6,
        Some(p) if p < 0.20 => 0.4,
        Some(_) => 0.2,
    }
}

fn apply_signal_adjustments(
    base: f64,
    signal_type: SignalType,
    trend_strength: f64,
    momentum_confirmation: f64,
) -> f64 {
    match signal_type {
        // MA crosses earn a bonus when the trend is already strong.
        SignalType::GoldenCross | SignalType::DeathCross if trend_strength > 0.7 => base * 1.1,
        // MACD crosses without momentum behind them are discounted.
        SignalType::MacdBullish | SignalType::MacdBearish if momentum_confirmation < 0.3 => {
            base * 0.8
        }
        // RSI reversals in a ranging market are mostly noise.
        SignalType::RsiOversold | SignalType::RsiOverbought if trend_strength < 0.3 => base * 0.7,
        _ => base,
    }
}

/// Percentile of `current` within `history` (0-100). Needs at least 20
/// observations to be meaningful.
pub fn histogram_percentile(current: f64, history: &[f64]) -> Option<f64> {
    if history.len() < 20 {
        return None;
    }
    stats::percentile_of_score(history, current)
}

/// P-value of the regression over the last `window` closes; `None` when the
/// series is shorter than the window or degenerate.
pub fn short_term_pvalue(closes: &[f64], window: usize) -> Option<f64> {
    if closes.len() < window {
        return None;
    }
    let recent = &closes[closes.len() - window..];
    stats::linear_regression(recent).map(|fit| fit.p_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_inputs_score_one_half() {
        let breakdown = calculate_confidence(&ConfidenceInputs::default());
        assert_eq!(breakdown.trend_strength, 0.5);
        assert_eq!(breakdown.momentum_confirmation, 0.5);
        assert_eq!(breakdown.volatility_context, 0.5);
        assert_eq!(breakdown.statistical_noise, 0.5);
        assert!((breakdown.overall_confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn adx_piecewise_table() {
        assert_eq!(trend_strength_score(Some(15.0)), 0.0);
        assert_eq!(trend_strength_score(Some(22.0)), 0.25);
        assert!((trend_strength_score(Some(34.0)) - 0.80).abs() < 1e-12);
        assert_eq!(trend_strength_score(Some(55.0)), 1.0);
    }

    #[test]
    fn momentum_rewards_extremes() {
        assert_eq!(momentum_score(Some(95.0)), 0.9);
        assert_eq!(momentum_score(Some(5.0)), 0.9);
        assert_eq!(momentum_score(Some(75.0)), 0.7);
        assert_eq!(momentum_score(Some(35.0)), 0.5);
        assert_eq!(momentum_score(Some(50.0)), 0.3);
    }

    #[test]
    fn breakouts_prefer_squeeze_others_prefer_midrange() {
        assert_eq!(volatility_score(Some(5.0), Some(SignalType::BollingerBreakout)), 1.0);
        assert_eq!(volatility_score(Some(60.0), Some(SignalType::BollingerBreakout)), 0.3);
        assert_eq!(volatility_score(Some(50.0), Some(SignalType::MacdBullish)), 0.8);
        assert_eq!(volatility_score(Some(5.0), Some(SignalType::MacdBullish)), 0.4);
        assert_eq!(volatility_score(Some(50.0), None), 0.8);
    }

    #[test]
    fn confidence_is_monotone_in_p_value() {
        let mut last = f64::MAX;
        for p in [0.005, 0.03, 0.07, 0.15, 0.5] {
            let breakdown = calculate_confidence(&ConfidenceInputs {
                recent_price_pvalue: Some(p),
                ..Default::default()
            });
            assert!(
                breakdown.overall_confidence <= last,
                "confidence must not rise as p-value grows"
            );
            last = breakdown.overall_confidence;
        }
    }

    #[test]
    fn golden_cross_bonus_requires_strong_trend() {
        let strong = calculate_confidence(&ConfidenceInputs {
            adx: Some(50.0),
            signal_type: Some(SignalType::GoldenCross),
            ..Default::default()
        });
        let weak = calculate_confidence(&ConfidenceInputs {
            adx: Some(22.0),
            signal_type: Some(SignalType::GoldenCross),
            ..Default::default()
        });
        // Base with full trend strength: 0.4*1.0 + 0.3*0.5 + 0.2*0.5 + 0.1*0.5 = 0.70
        assert!((strong.overall_confidence - 0.70 * 1.1).abs() < 1e-12);
        assert!((weak.overall_confidence - (0.4 * 0.25 + 0.3)).abs() < 1e-12);
    }

    #[test]
    fn macd_and_rsi_penalties_apply() {
        let macd = calculate_confidence(&ConfidenceInputs {
            adx: Some(30.0),
            macd_histogram_percentile: Some(50.0), // weak momentum => 0.3, not < 0.3
            signal_type: Some(SignalType::MacdBullish),
            ..Default::default()
        });
        // 0.3 is not strictly below the cutoff; no penalty.
        let base = 0.4 * (0.50 + 5.0 / 30.0) + 0.3 * 0.3 + 0.2 * 0.5 + 0.1 * 0.5;
        assert!((macd.overall_confidence - base).abs() < 1e-12);

        let rsi = calculate_confidence(&ConfidenceInputs {
            adx: Some(15.0), // ranging market
            signal_type: Some(SignalType::RsiOversold),
            ..Default::default()
        });
        let base = 0.4 * 0.0 + 0.3 * 0.5 + 0.2 * 0.5 + 0.1 * 0.5;
        assert!((rsi.overall_confidence - base * 0.7).abs() < 1e-12);
    }

    #[test]
    fn overall_stays_clamped() {
        let breakdown = calculate_confidence(&ConfidenceInputs {
            adx: Some(80.0),
            macd_histogram_percentile: Some(99.0),
            bollinger_bandwidth_percentile: Some(50.0),
            recent_price_pvalue: Some(0.001),
            signal_type: Some(SignalType::GoldenCross),
        });
        assert!(breakdown.overall_confidence <= 1.0);
        assert!(breakdown.overall_confidence >= 0.0);
    }

    #[test]
    fn histogram_percentile_needs_history() {
        let short = vec![1.0; 19];
        assert!(histogram_percentile(0.5, &short).is_none());
        let history: Vec<f64> = (0..40).map(|i| i as f64).collect();
        assert_eq!(histogram_percentile(19.0, &history), Some(50.0));
    }

    #[test]
    fn short_term_pvalue_handles_short_and_flat_input() {
        assert!(short_term_pvalue(&[1.0, 2.0, 3.0], 5).is_none());
        assert!(short_term_pvalue(&[5.0; 10], 5).is_none());
        let trending: Vec<f64> = (0..10).map(|i| 100.0 + i as f64 * 2.0).collect();
        let p = short_term_pvalue(&trending, 5).unwrap();
        assert!(p < 0.01);
    }
}
