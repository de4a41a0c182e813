//! Trend classifier: per (asset, timeframe) direction, magnitude and a
//! calibrated confidence.
//!
//! Two classification paths exist behind the mode flag. The legacy path
//! classifies on price change with a linear-regression confidence; the
//! advanced path classifies on price position against SMA(50)/EMA(20)
//! alignment and scores through the confidence model. Their thresholds
//! differ on purpose and must not be reconciled.

use crate::application::confidence::{self, ConfidenceInputs};
use crate::application::indicators::IndicatorSet;
use crate::application::stats;
use crate::application::thresholds;
use crate::domain::types::{AnalysisMode, Bar, Timeframe, TrendRecord, TrendType, VolatilityRegime};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct TrendConfig {
    /// Minimum points per timeframe window (7d / 14d / 30d).
    pub min_points_7d: usize,
    pub min_points_14d: usize,
    pub min_points_30d: usize,
    /// Bars needed before the indicator-driven path engages.
    pub advanced_min_bars: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_points_7d: 3,
            min_points_14d: 5,
            min_points_30d: 15,
            advanced_min_bars: 50,
        }
    }
}

impl TrendConfig {
    fn min_points(&self, timeframe: Timeframe) -> usize {
        match timeframe {
            Timeframe::Days7 => self.min_points_7d,
            Timeframe::Days14 => self.min_points_14d,
            Timeframe::Days30 => self.min_points_30d,
        }
    }
}

pub struct TrendAnalyzer {
    mode: AnalysisMode,
    config: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new(mode: AnalysisMode) -> Self {
        Self {
            mode,
            config: TrendConfig::default(),
        }
    }

    pub fn with_config(mode: AnalysisMode, config: TrendConfig) -> Self {
        Self { mode, config }
    }

    /// Classify one (asset, timeframe) window. Returns `None` when the
    /// window is too thin or numerically degenerate; those are skips, not
    /// errors.
    pub fn analyze(
        &self,
        asset_id: i32,
        bars: &[Bar],
        indicators: Option<&IndicatorSet>,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Option<TrendRecord> {
        match (self.mode, indicators) {
            (AnalysisMode::Advanced, Some(ind)) => {
                self.analyze_advanced(asset_id, bars, ind, timeframe, now)
            }
            _ => self.analyze_legacy(asset_id, bars, timeframe, now),
        }
    }

    fn analyze_legacy(
        &self,
        asset_id: i32,
        bars: &[Bar],
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Option<TrendRecord> {
        let cutoff = now - Duration::days(timeframe.days());
        let window: Vec<&Bar> = bars.iter().filter(|b| b.timestamp >= cutoff).collect();
        if window.len() < self.config.min_points(timeframe) {
            return None;
        }

        let closes: Vec<f64> = window.iter().map(|b| b.close).collect();
        let first_close = closes[0];
        let last_close = closes[closes.len() - 1];
        if first_close == 0.0 {
            warn!(asset_id, %timeframe, "skipping trend: zero starting price");
            return None;
        }

        let Some(fit) = stats::linear_regression(&closes) else {
            warn!(asset_id, %timeframe, "skipping trend: degenerate price series");
            return None;
        };

        let price_change_percent = (last_close - first_close) / first_close * 100.0;
        let mean = stats::mean(&closes)?;
        if mean == 0.0 {
            warn!(asset_id, %timeframe, "skipping trend: zero mean price");
            return None;
        }
        let volatility_cv = stats::std_dev(&closes)? / mean * 100.0;

        let trend_type = classify_legacy(price_change_percent, &fit);

        let timeframe_bonus = match timeframe {
            Timeframe::Days7 => 0.1,
            Timeframe::Days14 => 0.2,
            Timeframe::Days30 => 0.3,
        };
        let significance_bonus = if fit.p_value < 0.05 {
            0.2
        } else if fit.p_value < 0.10 {
            0.1
        } else {
            0.0
        };
        let volatility_penalty = (volatility_cv / 100.0).min(0.3);
        let confidence = (fit.r_squared + timeframe_bonus + significance_bonus
            - volatility_penalty)
            .clamp(0.0, 1.0);

        Some(TrendRecord {
            asset_id,
            timeframe,
            trend_type,
            confidence,
            start_time: window[0].timestamp,
            end_time: window[window.len() - 1].timestamp,
            price_change_percent,
            metadata: json!({
                "slope": fit.slope,
                "r_squared": fit.r_squared,
                "p_value": fit.p_value,
                "volatility": volatility_cv,
                "data_points": window.len(),
                "start_price": first_close,
                "end_price": last_close,
                "timeframe_days": timeframe.days(),
                "analysis_mode": "legacy",
            }),
        })
    }

    fn analyze_advanced(
        &self,
        asset_id: i32,
        bars: &[Bar],
        indicators: &IndicatorSet,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Option<TrendRecord> {
        if bars.len() < self.config.advanced_min_bars {
            return None;
        }

        let cutoff = now - Duration::days(timeframe.days());
        let window: Vec<&Bar> = bars.iter().filter(|b| b.timestamp >= cutoff).collect();
        if window.len() < 3 {
            return None;
        }

        let first_close = window[0].close;
        let current_price = window[window.len() - 1].close;
        if first_close == 0.0 {
            warn!(asset_id, %timeframe, "skipping trend: zero starting price");
            return None;
        }
        let price_change_percent = (current_price - first_close) / first_close * 100.0;

        // The window always extends to the end of the series, so the final
        // in-window indicator values are the series tails.
        let sma_current = indicators.sma_fast.last().copied().flatten();
        let ema_current = indicators.ema.last().copied().flatten();
        let adx_current = indicators.adx.last().copied().flatten();
        let atr_current = indicators.atr.last().copied().flatten();

        let trend_type = match (sma_current, ema_current) {
            (Some(sma), Some(ema)) => {
                if current_price > sma && ema > sma {
                    TrendType::Uptrend
                } else if current_price < sma && ema < sma {
                    TrendType::Downtrend
                } else {
                    TrendType::Sideways
                }
            }
            // MAs unavailable: fall back to price change with the wider
            // sideways band this path has always used.
            _ => {
                if price_change_percent.abs() < 3.0 {
                    TrendType::Sideways
                } else if price_change_percent > 5.0 {
                    TrendType::Uptrend
                } else {
                    TrendType::Downtrend
                }
            }
        };

        // Volatility context from the ATR history modulates the move
        // thresholds recorded alongside the classification.
        let atr_history: Vec<f64> = indicators.atr.iter().flatten().copied().collect();
        let regime = atr_current
            .map(|atr| thresholds::classify_volatility_regime(atr, &atr_history, 50))
            .unwrap_or(VolatilityRegime::Normal);
        let significant_move = atr_current.map(|atr| {
            thresholds::atr_thresholds(atr, &thresholds::regime_adjusted_multipliers(regime))
                .significant_move
        });
        let price_change_atr_units = atr_current
            .map(|atr| thresholds::normalize_price_change(current_price - first_close, atr));

        let breakdown = confidence::calculate_confidence(&ConfidenceInputs {
            adx: adx_current,
            ..Default::default()
        });

        Some(TrendRecord {
            asset_id,
            timeframe,
            trend_type,
            confidence: breakdown.overall_confidence,
            start_time: window[0].timestamp,
            end_time: window[window.len() - 1].timestamp,
            price_change_percent,
            metadata: json!({
                "price_change_percent": price_change_percent,
                "sma_50": sma_current,
                "ema_20": ema_current,
                "adx": adx_current,
                "atr": atr_current,
                "atr_degraded": indicators.ohlc_degraded,
                "volatility_regime": regime.as_str(),
                "significant_move_threshold": significant_move,
                "price_change_atr_units": price_change_atr_units,
                "data_points": window.len(),
                "start_price": first_close,
                "end_price": current_price,
                "confidence_components": breakdown,
                "analysis_mode": "advanced",
            }),
        })
    }
}

/// Legacy classification: price change decides outright within +/-1% and
/// beyond +/-5%; in the inconclusive band between, a sufficiently strong
/// regression fit (r^2 >= 0.3) breaks the tie by slope sign.
fn classify_legacy(price_change_percent: f64, fit: &stats::LinearFit) -> TrendType {
    if price_change_percent.abs() < 1.0 {
        TrendType::Sideways
    } else if price_change_percent > 5.0 {
        TrendType::Uptrend
    } else if price_change_percent < -5.0 {
        TrendType::Downtrend
    } else if fit.r_squared >= 0.3 {
        if fit.slope > 0.0 {
            TrendType::Uptrend
        } else {
            TrendType::Downtrend
        }
    } else {
        TrendType::Sideways
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily_bars(closes: &[f64], now: DateTime<Utc>) -> Vec<Bar> {
        let n = closes.len();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                asset_id: 1,
                timestamp: now - Duration::days((n - 1 - i) as i64),
                close,
                volume: 1000.0,
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

    #[test]
    fn classification_thresholds() {
        let strong_up = stats::LinearFit {
            slope: 1.0,
            intercept: 0.0,
            r_value: 0.9,
            r_squared: 0.81,
            p_value: 0.01,
            std_err: 0.1,
        };
        let weak = stats::LinearFit {
            r_squared: 0.05,
            ..strong_up
        };
        let strong_down = stats::LinearFit {
            slope: -1.0,
            ..strong_up
        };

        assert_eq!(classify_legacy(0.5, &strong_up), TrendType::Sideways);
        assert_eq!(classify_legacy(6.0, &weak), TrendType::Uptrend);
        assert_eq!(classify_legacy(-6.0, &weak), TrendType::Downtrend);
        // Inconclusive band: a strong fit breaks the tie, a weak one stays
        // sideways.
        assert_eq!(classify_legacy(3.0, &strong_up), TrendType::Uptrend);
        assert_eq!(classify_legacy(-3.0, &strong_down), TrendType::Downtrend);
        assert_eq!(classify_legacy(3.0, &weak), TrendType::Sideways);
    }

    #[test]
    fn sideways_series_classifies_sideways_with_low_confidence() {
        let now = Utc::now();
        let closes: Vec<f64> = (0..31)
            .map(|i| 100.0 + if i % 2 == 0 { -1.0 } else { 1.0 })
            .collect();
        let analyzer = TrendAnalyzer::new(AnalysisMode::Legacy);
        let record = analyzer
            .analyze(1, &daily_bars(&closes, now), None, Timeframe::Days30, now)
            .unwrap();
        assert_eq!(record.trend_type, TrendType::Sideways);
        assert!(record.price_change_percent.abs() < 1.0);
        assert!(record.confidence >= 0.0 && record.confidence <= 1.0);
    }

    #[test]
    fn strong_rise_is_never_a_downtrend() {
        let now = Utc::now();
        let closes: Vec<f64> = (0..8).map(|i| 100.0 * (1.0 + 0.02 * i as f64)).collect();
        let analyzer = TrendAnalyzer::new(AnalysisMode::Legacy);
        let record = analyzer
            .analyze(1, &daily_bars(&closes, now), None, Timeframe::Days7, now)
            .unwrap();
        assert!(record.price_change_percent > 5.0);
        assert_eq!(record.trend_type, TrendType::Uptrend);

        let falling: Vec<f64> = closes.iter().rev().copied().collect();
        let record = analyzer
            .analyze(1, &daily_bars(&falling, now), None, Timeframe::Days7, now)
            .unwrap();
        assert!(record.price_change_percent < -5.0);
        assert_eq!(record.trend_type, TrendType::Downtrend);
    }

    #[test]
    fn scale_invariance_preserves_classification() {
        let now = Utc::now();
        let closes: Vec<f64> = (0..10).map(|i| 50.0 + i as f64).collect();
        let scaled: Vec<f64> = closes.iter().map(|c| c * 1000.0).collect();
        let analyzer = TrendAnalyzer::new(AnalysisMode::Legacy);
        let a = analyzer
            .analyze(1, &daily_bars(&closes, now), None, Timeframe::Days7, now)
            .unwrap();
        let b = analyzer
            .analyze(1, &daily_bars(&scaled, now), None, Timeframe::Days7, now)
            .unwrap();
        assert_eq!(a.trend_type, b.trend_type);
        assert!((a.price_change_percent - b.price_change_percent).abs() < 1e-9);
    }

    #[test]
    fn price_change_moves_continuously_under_small_shifts() {
        let now = Utc::now();
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + 2.0 * i as f64).collect();
        let analyzer = TrendAnalyzer::new(AnalysisMode::Legacy);
        let base = analyzer
            .analyze(1, &daily_bars(&closes, now), None, Timeframe::Days7, now)
            .unwrap();
        let shifted: Vec<f64> = closes.iter().map(|c| c + 0.01).collect();
        let moved = analyzer
            .analyze(1, &daily_bars(&shifted, now), None, Timeframe::Days7, now)
            .unwrap();
        assert_eq!(base.trend_type, moved.trend_type);
        assert!((base.price_change_percent - moved.price_change_percent).abs() < 0.01);
    }

    #[test]
    fn thin_windows_and_degenerate_series_are_skipped() {
        let now = Utc::now();
        let analyzer = TrendAnalyzer::new(AnalysisMode::Legacy);

        // Two points under a 3-point minimum.
        assert!(
            analyzer
                .analyze(1, &daily_bars(&[100.0, 101.0], now), None, Timeframe::Days7, now)
                .is_none()
        );

        // Flat series: regression is undefined.
        assert!(
            analyzer
                .analyze(1, &daily_bars(&[100.0; 10], now), None, Timeframe::Days7, now)
                .is_none()
        );

        // Zero starting price.
        assert!(
            analyzer
                .analyze(1, &daily_bars(&[0.0, 1.0, 2.0, 3.0], now), None, Timeframe::Days7, now)
                .is_none()
        );

        // 30d window needs 15 points.
        let few: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        assert!(
            analyzer
                .analyze(1, &daily_bars(&few, now), None, Timeframe::Days30, now)
                .is_none()
        );
    }

    #[test]
    fn significance_raises_legacy_confidence() {
        let now = Utc::now();
        // Clean ramp: tiny p-value, near-perfect r^2.
        let clean: Vec<f64> = (0..7).map(|i| 100.0 + 0.2 * i as f64).collect();
        let analyzer = TrendAnalyzer::new(AnalysisMode::Legacy);
        let clean_rec = analyzer
            .analyze(1, &daily_bars(&clean, now), None, Timeframe::Days7, now)
            .unwrap();

        // Noisy saw: no significant fit.
        let noisy: Vec<f64> = (0..7)
            .map(|i| 100.0 + if i % 2 == 0 { 4.0 } else { -4.0 })
            .collect();
        let noisy_rec = analyzer
            .analyze(1, &daily_bars(&noisy, now), None, Timeframe::Days7, now)
            .unwrap();

        assert!(clean_rec.confidence > noisy_rec.confidence);
    }

    #[test]
    fn advanced_mode_needs_fifty_bars() {
        let now = Utc::now();
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let bars = daily_bars(&closes, now);
        let indicators = IndicatorSet::compute(&bars, &Default::default());
        let analyzer = TrendAnalyzer::new(AnalysisMode::Advanced);
        assert!(
            analyzer
                .analyze(1, &bars, Some(&indicators), Timeframe::Days7, now)
                .is_none()
        );
    }

    #[test]
    fn advanced_mode_classifies_by_ma_alignment() {
        let now = Utc::now();
        // 80 bars rising: price above SMA(50), EMA(20) above SMA(50).
        let rising: Vec<f64> = (0..80).map(|i| 100.0 + 2.0 * i as f64).collect();
        let bars = daily_bars(&rising, now);
        let indicators = IndicatorSet::compute(&bars, &Default::default());
        let analyzer = TrendAnalyzer::new(AnalysisMode::Advanced);
        let record = analyzer
            .analyze(1, &bars, Some(&indicators), Timeframe::Days30, now)
            .unwrap();
        assert_eq!(record.trend_type, TrendType::Uptrend);
        assert_eq!(record.metadata["analysis_mode"], "advanced");
        assert!(record.metadata["confidence_components"]["overall_confidence"].is_number());

        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        let bars = daily_bars(&falling, now);
        let indicators = IndicatorSet::compute(&bars, &Default::default());
        let record = analyzer
            .analyze(1, &bars, Some(&indicators), Timeframe::Days30, now)
            .unwrap();
        assert_eq!(record.trend_type, TrendType::Downtrend);
    }
}
