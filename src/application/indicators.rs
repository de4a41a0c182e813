//! Indicator kernel: batch computation over a time-sorted bar series.
//!
//! Every function returns a series parallel to its input where warm-up
//! entries (index < period) are `None`. Downstream code treats `None` as
//! "indicator unavailable for this bar", never as zero. All outputs are
//! deterministic for a given input series.

use crate::domain::types::Bar;

/// A time-indexed indicator series, parallel to the input bars.
pub type Series = Vec<Option<f64>>;

#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub sma_fast_period: usize,
    pub sma_slow_period: usize,
    pub ema_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub adx_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_fast_period: 50,
            sma_slow_period: 200,
            ema_period: 20,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std_dev: 2.0,
            rsi_period: 14,
            atr_period: 14,
            adx_period: 14,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub macd_line: Series,
    pub signal_line: Series,
    pub histogram: Series,
}

#[derive(Debug, Clone)]
pub struct BollingerSeries {
    pub lower: Series,
    pub middle: Series,
    pub upper: Series,
    /// (upper - lower) / middle
    pub bandwidth: Series,
}

/// Full indicator state for one asset, computed once per analysis pass.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    pub sma_fast: Series,
    pub sma_slow: Series,
    pub ema: Series,
    pub macd: MacdSeries,
    pub bollinger: BollingerSeries,
    pub rsi: Series,
    pub atr: Series,
    pub adx: Series,
    /// True when any bar lacked high/low and ATR/ADX fell back to
    /// close-to-close ranges.
    pub ohlc_degraded: bool,
}

impl IndicatorSet {
    pub fn compute(bars: &[Bar], cfg: &IndicatorConfig) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let highs: Vec<f64> = bars.iter().map(|b| b.high_or_close()).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low_or_close()).collect();
        let ohlc_degraded = bars.iter().any(|b| b.high.is_none() || b.low.is_none());

        Self {
            sma_fast: sma(&closes, cfg.sma_fast_period),
            sma_slow: sma(&closes, cfg.sma_slow_period),
            ema: ema(&closes, cfg.ema_period),
            macd: macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal),
            bollinger: bollinger(&closes, cfg.bb_period, cfg.bb_std_dev),
            rsi: rsi(&closes, cfg.rsi_period),
            atr: atr(&highs, &lows, &closes, cfg.atr_period),
            adx: adx(&highs, &lows, &closes, cfg.adx_period),
            ohlc_degraded,
        }
    }
}

/// Simple moving average of `values`.
pub fn sma(values: &[f64], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut window_sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(window_sum / period as f64);
    for i in period..values.len() {
        window_sum += values[i] - values[i - period];
        out[i] = Some(window_sum / period as f64);
    }
    out
}

/// Exponential moving average seeded with the SMA of the first `period`
/// values, alpha = 2 / (period + 1).
pub fn ema(values: &[f64], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut current: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(current);
    for i in period..values.len() {
        current = alpha * values[i] + (1.0 - alpha) * current;
        out[i] = Some(current);
    }
    out
}

/// MACD line, signal line and histogram. The MACD line is defined where the
/// slow EMA is; the signal line is an EMA of the defined MACD values.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let n = values.len();
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);

    let mut macd_line: Series = vec![None; n];
    for i in 0..n {
        if let (Some(f), Some(s)) = (fast_ema[i], slow_ema[i]) {
            macd_line[i] = Some(f - s);
        }
    }

    let defined: Vec<f64> = macd_line.iter().flatten().copied().collect();
    let offset = n - defined.len();
    let signal_defined = ema(&defined, signal);

    let mut signal_line: Series = vec![None; n];
    let mut histogram: Series = vec![None; n];
    for (j, sig) in signal_defined.into_iter().enumerate() {
        if let Some(sig) = sig {
            let i = offset + j;
            signal_line[i] = Some(sig);
            histogram[i] = Some(defined[j] - sig);
        }
    }

    MacdSeries {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Bollinger Bands around an SMA, plus the normalized bandwidth used for
/// squeeze detection.
pub fn bollinger(values: &[f64], period: usize, k: f64) -> BollingerSeries {
    let n = values.len();
    let middle = sma(values, period);
    let mut lower: Series = vec![None; n];
    let mut upper: Series = vec![None; n];
    let mut bandwidth: Series = vec![None; n];

    for i in 0..n {
        let Some(mid) = middle[i] else { continue };
        let window = &values[i + 1 - period..=i];
        let var = window.iter().map(|v| (v - mid) * (v - mid)).sum::<f64>() / period as f64;
        let dev = k * var.sqrt();
        let lo = mid - dev;
        let hi = mid + dev;
        lower[i] = Some(lo);
        upper[i] = Some(hi);
        if mid != 0.0 {
            bandwidth[i] = Some((hi - lo) / mid);
        }
    }

    BollingerSeries {
        lower,
        middle,
        upper,
        bandwidth,
    }
}

/// Relative Strength Index with Wilder smoothing of average gain/loss.
pub fn rsi(values: &[f64], period: usize) -> Series {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period + 1 {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    let smoothing = (period - 1) as f64;
    for i in period + 1..n {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * smoothing + gain) / period as f64;
        avg_loss = (avg_loss * smoothing + loss) / period as f64;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // Flat series is neutral; pure gains saturate.
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Average True Range, Wilder-smoothed. With close-only data (high = low =
/// close) the true range degenerates to |close - prev_close|.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Series {
    let n = closes.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    let tr = true_ranges(highs, lows, closes);
    let mut current: f64 = tr[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(current);
    for i in period..n {
        current = (current * (period - 1) as f64 + tr[i]) / period as f64;
        out[i] = Some(current);
    }
    out
}

fn true_ranges(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let n = closes.len();
    let mut tr = Vec::with_capacity(n);
    for i in 0..n {
        if i == 0 {
            tr.push(highs[0] - lows[0]);
        } else {
            let prev_close = closes[i - 1];
            let range = (highs[i] - lows[i])
                .max((highs[i] - prev_close).abs())
                .max((lows[i] - prev_close).abs());
            tr.push(range);
        }
    }
    tr
}

/// Average Directional Index: Wilder-smoothed directional movement ratio.
/// Needs 2 * period bars to produce its first value. When directional
/// movement nets to zero (e.g. degraded close-only flat data) DX is 0.
pub fn adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Series {
    let n = closes.len();
    let mut out = vec![None; n];
    if period == 0 || n < 2 * period {
        return out;
    }

    let tr = true_ranges(highs, lows, closes);
    // Directional movement is defined from the second bar onward.
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let mut sm_tr: f64 = tr[1..=period].iter().sum();
    let mut sm_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut sm_minus: f64 = minus_dm[1..=period].iter().sum();

    let mut dx_values: Vec<f64> = Vec::with_capacity(n - period);
    let mut adx_current: Option<f64> = None;

    for i in period..n {
        if i > period {
            sm_tr = sm_tr - sm_tr / period as f64 + tr[i];
            sm_plus = sm_plus - sm_plus / period as f64 + plus_dm[i];
            sm_minus = sm_minus - sm_minus / period as f64 + minus_dm[i];
        }

        let (di_plus, di_minus) = if sm_tr > 0.0 {
            (100.0 * sm_plus / sm_tr, 100.0 * sm_minus / sm_tr)
        } else {
            (0.0, 0.0)
        };
        let di_sum = di_plus + di_minus;
        let dx = if di_sum > 0.0 {
            100.0 * (di_plus - di_minus).abs() / di_sum
        } else {
            0.0
        };
        dx_values.push(dx);

        match adx_current {
            None => {
                if dx_values.len() == period {
                    let seed = dx_values.iter().sum::<f64>() / period as f64;
                    adx_current = Some(seed);
                    out[i] = Some(seed);
                }
            }
            Some(prev) => {
                let next = (prev * (period - 1) as f64 + dx) / period as f64;
                adx_current = Some(next);
                out[i] = Some(next);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(n: usize, value: f64) -> Vec<f64> {
        vec![value; n]
    }

    #[test]
    fn sma_of_constant_series_is_the_constant() {
        let out = sma(&constant(30, 42.0), 5);
        for (i, v) in out.iter().enumerate() {
            if i < 4 {
                assert!(v.is_none(), "warm-up at {i} must be missing");
            } else {
                assert!((v.unwrap() - 42.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn ema_of_constant_series_is_the_constant() {
        let out = ema(&constant(30, 7.5), 10);
        assert!(out[8].is_none());
        for v in out.iter().skip(9) {
            assert!((v.unwrap() - 7.5).abs() < 1e-12);
        }
    }

    #[test]
    fn sma_tracks_a_ramp() {
        let values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let out = sma(&values, 3);
        assert_eq!(out[2], Some(1.0));
        assert_eq!(out[9], Some(8.0));
    }

    #[test]
    fn macd_histogram_is_line_minus_signal() {
        let values: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.35).sin() * 5.0).collect();
        let m = macd(&values, 12, 26, 9);
        assert_eq!(m.macd_line.len(), values.len());
        // First defined MACD value sits where the slow EMA starts.
        assert!(m.macd_line[24].is_none());
        assert!(m.macd_line[25].is_some());
        // Signal needs another 8 defined values.
        assert!(m.signal_line[32].is_none());
        assert!(m.signal_line[33].is_some());
        for i in 0..values.len() {
            if let (Some(line), Some(sig), Some(hist)) =
                (m.macd_line[i], m.signal_line[i], m.histogram[i])
            {
                assert!((hist - (line - sig)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn bollinger_bands_bracket_the_middle() {
        let values: Vec<f64> = (0..60).map(|i| 50.0 + (i as f64 * 0.7).cos() * 3.0).collect();
        let bb = bollinger(&values, 20, 2.0);
        for i in 19..values.len() {
            let (lo, mid, hi) = (bb.lower[i].unwrap(), bb.middle[i].unwrap(), bb.upper[i].unwrap());
            assert!(lo <= mid && mid <= hi);
            let bw = bb.bandwidth[i].unwrap();
            assert!((bw - (hi - lo) / mid).abs() < 1e-12);
        }
    }

    #[test]
    fn rsi_saturates_on_monotonic_rise_and_stays_bounded() {
        let rising: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&rising, 14);
        assert!(out[13].is_none());
        assert_eq!(out[14], Some(100.0));

        let wiggly: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 1.3).sin() * 4.0).collect();
        for v in rsi(&wiggly, 14).iter().flatten() {
            assert!((0.0..=100.0).contains(v));
        }
    }

    #[test]
    fn atr_degenerates_to_close_to_close_change() {
        // high = low = close: the true range collapses to |delta close|.
        let closes: Vec<f64> = vec![10.0, 12.0, 11.0, 15.0, 15.0, 14.0, 18.0, 17.0];
        let out = atr(&closes, &closes, &closes, 3);
        // TR = [0, 2, 1, 4, 0, 1, 4, 1]; seed mean(0,2,1) = 1.0
        assert!((out[2].unwrap() - 1.0).abs() < 1e-12);
        let expected = (1.0 * 2.0 + 4.0) / 3.0;
        assert!((out[3].unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn adx_warms_up_and_stays_in_range() {
        let n = 120;
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 0.8).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();
        let out = adx(&highs, &lows, &closes, 14);
        assert!(out[26].is_none());
        assert!(out[27].is_some());
        for v in out.iter().flatten() {
            assert!((0.0..=100.0).contains(v));
        }
        // Persistent one-way movement reads as a strong trend.
        assert!(out[n - 1].unwrap() > 40.0);
    }

    #[test]
    fn indicator_set_flags_ohlc_degradation() {
        let bars: Vec<Bar> = (0..60)
            .map(|i| Bar {
                asset_id: 1,
                timestamp: chrono::Utc::now(),
                close: 100.0 + i as f64,
                volume: 1.0,
                open: None,
                high: None,
                low: None,
                market_cap: None,
                percent_change_1h: None,
                percent_change_24h: None,
                percent_change_7d: None,
            })
            .collect();
        let set = IndicatorSet::compute(&bars, &IndicatorConfig::default());
        assert!(set.ohlc_degraded);
        assert_eq!(set.rsi.len(), bars.len());
    }
}
