use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A tracked cryptocurrency. Immutable within a single analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: i32,
    pub symbol: String,
    pub name: String,
    pub coingecko_id: Option<String>,
    pub cmc_id: Option<i64>,
    pub rank: Option<i32>,
    pub is_active: bool,
}

/// One time-indexed OHLCV sample. OHLC columns are optional; consumers that
/// need them approximate open = high = low = close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub asset_id: i32,
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub volume: f64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub market_cap: Option<f64>,
    pub percent_change_1h: Option<f64>,
    pub percent_change_24h: Option<f64>,
    pub percent_change_7d: Option<f64>,
}

impl Bar {
    /// Effective high, falling back to close when OHLC is absent.
    pub fn high_or_close(&self) -> f64 {
        self.high.unwrap_or(self.close)
    }

    /// Effective low, falling back to close when OHLC is absent.
    pub fn low_or_close(&self) -> f64 {
        self.low.unwrap_or(self.close)
    }
}

/// Trailing look-back window for trend classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Days7,
    Days14,
    Days30,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::Days7, Timeframe::Days14, Timeframe::Days30];

    pub fn days(&self) -> i64 {
        match self {
            Timeframe::Days7 => 7,
            Timeframe::Days14 => 14,
            Timeframe::Days30 => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Days7 => "7d",
            Timeframe::Days14 => "14d",
            Timeframe::Days30 => "30d",
        }
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "7d" => Ok(Timeframe::Days7),
            "14d" => Ok(Timeframe::Days14),
            "30d" => Ok(Timeframe::Days30),
            _ => anyhow::bail!("Invalid timeframe: {}. Must be '7d', '14d' or '30d'", s),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendType {
    Uptrend,
    Downtrend,
    Sideways,
}

impl TrendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendType::Uptrend => "uptrend",
            TrendType::Downtrend => "downtrend",
            TrendType::Sideways => "sideways",
        }
    }
}

impl FromStr for TrendType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uptrend" => Ok(TrendType::Uptrend),
            "downtrend" => Ok(TrendType::Downtrend),
            "sideways" => Ok(TrendType::Sideways),
            _ => anyhow::bail!("Unknown trend type: {}", s),
        }
    }
}

impl std::fmt::Display for TrendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recognized discrete market patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalType {
    PumpAndDump,
    VolumeAnomaly,
    BottomedOut,
    ParabolicRise,
    CapitulationDrop,
    MacdBullish,
    MacdBearish,
    GoldenCross,
    DeathCross,
    BollingerBreakout,
    RsiOversold,
    RsiOverbought,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::PumpAndDump => "pump_and_dump",
            SignalType::VolumeAnomaly => "volume_anomaly",
            SignalType::BottomedOut => "bottomed_out",
            SignalType::ParabolicRise => "parabolic_rise",
            SignalType::CapitulationDrop => "capitulation_drop",
            SignalType::MacdBullish => "macd_bullish",
            SignalType::MacdBearish => "macd_bearish",
            SignalType::GoldenCross => "golden_cross",
            SignalType::DeathCross => "death_cross",
            SignalType::BollingerBreakout => "bollinger_breakout",
            SignalType::RsiOversold => "rsi_oversold",
            SignalType::RsiOverbought => "rsi_overbought",
        }
    }

    /// Breakout patterns score volatility context inversely (a tight squeeze
    /// is favorable).
    pub fn is_breakout(&self) -> bool {
        matches!(self, SignalType::BollingerBreakout)
    }
}

impl FromStr for SignalType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pump_and_dump" => Ok(SignalType::PumpAndDump),
            "volume_anomaly" => Ok(SignalType::VolumeAnomaly),
            "bottomed_out" => Ok(SignalType::BottomedOut),
            "parabolic_rise" => Ok(SignalType::ParabolicRise),
            "capitulation_drop" => Ok(SignalType::CapitulationDrop),
            "macd_bullish" => Ok(SignalType::MacdBullish),
            "macd_bearish" => Ok(SignalType::MacdBearish),
            "golden_cross" => Ok(SignalType::GoldenCross),
            "death_cross" => Ok(SignalType::DeathCross),
            "bollinger_breakout" => Ok(SignalType::BollingerBreakout),
            "rsi_oversold" => Ok(SignalType::RsiOversold),
            "rsi_overbought" => Ok(SignalType::RsiOverbought),
            _ => anyhow::bail!("Unknown signal type: {}", s),
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directional classification over one (asset, timeframe) window.
/// Uniqueness key: (asset_id, timeframe, start_time); re-analysis replaces
/// the non-key columns.
#[derive(Debug, Clone)]
pub struct TrendRecord {
    pub asset_id: i32,
    pub timeframe: Timeframe,
    pub trend_type: TrendType,
    pub confidence: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub price_change_percent: f64,
    pub metadata: serde_json::Value,
}

/// A dated recognition of a named pattern. Append-only at the store layer;
/// the detector owns uniqueness.
#[derive(Debug, Clone)]
pub struct SignalEvent {
    pub asset_id: i32,
    pub signal_type: SignalType,
    pub detected_at: DateTime<Utc>,
    pub confidence: f64,
    pub trigger_price: Option<f64>,
    pub volume_spike_ratio: Option<f64>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => anyhow::bail!("Unknown run status: {}", s),
        }
    }
}

/// Bookkeeping row for one orchestrator invocation. Transitions
/// running -> {completed, failed} exactly once.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub id: i64,
    pub run_type: String,
    pub status: RunStatus,
    pub records_processed: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Selects between the price-change classifier and the indicator-driven one.
/// The two paths keep deliberately different thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Legacy,
    Advanced,
}

impl FromStr for AnalysisMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "legacy" => Ok(AnalysisMode::Legacy),
            "advanced" => Ok(AnalysisMode::Advanced),
            _ => anyhow::bail!("Invalid ANALYSIS_MODE: {}. Must be 'legacy' or 'advanced'", s),
        }
    }
}

/// ATR-relative volatility classification; modulates threshold multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
}

impl VolatilityRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityRegime::Low => "low",
            VolatilityRegime::Normal => "normal",
            VolatilityRegime::High => "high",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_round_trips_through_str() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
        assert!("90d".parse::<Timeframe>().is_err());
    }

    #[test]
    fn signal_type_round_trips_through_str() {
        let all = [
            SignalType::PumpAndDump,
            SignalType::VolumeAnomaly,
            SignalType::BottomedOut,
            SignalType::ParabolicRise,
            SignalType::CapitulationDrop,
            SignalType::MacdBullish,
            SignalType::MacdBearish,
            SignalType::GoldenCross,
            SignalType::DeathCross,
            SignalType::BollingerBreakout,
            SignalType::RsiOversold,
            SignalType::RsiOverbought,
        ];
        for st in all {
            assert_eq!(st.as_str().parse::<SignalType>().unwrap(), st);
        }
    }

    #[test]
    fn bar_falls_back_to_close_without_ohlc() {
        let bar = Bar {
            asset_id: 1,
            timestamp: Utc::now(),
            close: 42.0,
            volume: 10.0,
            open: None,
            high: None,
            low: None,
            market_cap: None,
            percent_change_1h: None,
            percent_change_24h: None,
            percent_change_7d: None,
        };
        assert_eq!(bar.high_or_close(), 42.0);
        assert_eq!(bar.low_or_close(), 42.0);
    }
}
