//! Numeric primitives shared by the analysis components: least-squares
//! regression with significance, interpolated percentiles, median absolute
//! deviation. All math is double precision; degenerate shapes return `None`
//! instead of raising.

use statrs::distribution::{ContinuousCDF, StudentsT};

/// Result of an ordinary least-squares fit of `values` against their indices.
#[derive(Debug, Clone, Copy)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_value: f64,
    pub r_squared: f64,
    pub p_value: f64,
    pub std_err: f64,
}

/// Regress `values` against x = 0..n. Returns `None` for fewer than three
/// points or a series with zero variance (all-equal closes make the fit
/// meaningless; callers skip rather than divide by zero).
pub fn linear_regression(values: &[f64]) -> Option<LinearFit> {
    let n = values.len();
    if n < 3 {
        return None;
    }

    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / nf;

    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    let mut ss_xy = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        let dy = y - mean_y;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
        ss_xy += dx * dy;
    }

    if ss_xx == 0.0 || ss_yy == 0.0 {
        return None;
    }

    let slope = ss_xy / ss_xx;
    let intercept = mean_y - slope * mean_x;
    let r_value = (ss_xy / (ss_xx * ss_yy).sqrt()).clamp(-1.0, 1.0);
    let r_squared = r_value * r_value;
    let df = nf - 2.0;

    let (p_value, std_err) = if 1.0 - r_squared < 1e-12 {
        // Perfect fit: zero residual variance.
        (0.0, 0.0)
    } else {
        let t = r_value * (df / (1.0 - r_squared)).sqrt();
        let residual_var = (ss_yy - slope * ss_xy) / df;
        let std_err = (residual_var / ss_xx).sqrt();
        let dist = StudentsT::new(0.0, 1.0, df).ok()?;
        let p = 2.0 * (1.0 - dist.cdf(t.abs()));
        (p.clamp(0.0, 1.0), std_err)
    };

    Some(LinearFit {
        slope,
        intercept,
        r_value,
        r_squared,
        p_value,
        std_err,
    })
}

/// Percentile with linear interpolation between closest ranks (the NumPy
/// default). `pct` is on the 0-100 scale. Returns `None` on an empty slice.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Fraction of `history` less than or equal to `score`, scaled 0-100.
pub fn percentile_of_score(history: &[f64], score: f64) -> Option<f64> {
    if history.is_empty() {
        return None;
    }
    let at_or_below = history.iter().filter(|&&v| v <= score).count();
    Some(100.0 * at_or_below as f64 / history.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Median absolute deviation around the median (unscaled; callers apply the
/// 1.4826 MAD-to-sigma conversion where needed).
pub fn median_abs_deviation(values: &[f64]) -> Option<f64> {
    let m = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - m).abs()).collect();
    median(&deviations)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divisor n, matching the source pipeline's
/// volatility figures).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}
