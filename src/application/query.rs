//! Read-path policy: classified intents, timeframe cutoffs and filter
//! capping. The retrieval itself lives behind [`QueryGateway`]; the SQL
//! implementation sits in infrastructure.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};

/// Maximum result rows a single query may request.
pub const MAX_RESULT_LIMIT: i64 = 50;

/// The fixed set of query intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    PumpAndDump,
    BottomedOut,
    Uptrend,
    Downtrend,
    HighVolatility,
    VolumeSpike,
    Trending,
    Performance,
}

impl IntentKind {
    pub const ALL: [IntentKind; 8] = [
        IntentKind::PumpAndDump,
        IntentKind::BottomedOut,
        IntentKind::Uptrend,
        IntentKind::Downtrend,
        IntentKind::HighVolatility,
        IntentKind::VolumeSpike,
        IntentKind::Trending,
        IntentKind::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::PumpAndDump => "pump_and_dump",
            IntentKind::BottomedOut => "bottomed_out",
            IntentKind::Uptrend => "uptrend",
            IntentKind::Downtrend => "downtrend",
            IntentKind::HighVolatility => "high_volatility",
            IntentKind::VolumeSpike => "volume_spike",
            IntentKind::Trending => "trending",
            IntentKind::Performance => "performance",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            IntentKind::PumpAndDump => "Find potential pump and dump schemes",
            IntentKind::BottomedOut => "Find cryptocurrencies that may have bottomed out",
            IntentKind::Uptrend => "Find cryptocurrencies in uptrend",
            IntentKind::Downtrend => "Find cryptocurrencies in downtrend",
            IntentKind::HighVolatility => "Find highly volatile cryptocurrencies",
            IntentKind::VolumeSpike => "Find cryptocurrencies with unusual volume activity",
            IntentKind::Trending => "Find currently trending cryptocurrencies",
            IntentKind::Performance => "Find best or worst performing cryptocurrencies",
        }
    }
}

impl Serialize for IntentKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Trailing retrieval window for read queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryTimeframe {
    Hour1,
    #[default]
    Hours24,
    Days7,
    Days30,
}

impl QueryTimeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryTimeframe::Hour1 => "1h",
            QueryTimeframe::Hours24 => "24h",
            QueryTimeframe::Days7 => "7d",
            QueryTimeframe::Days30 => "30d",
        }
    }

    /// Unknown strings fall back to the 24h default.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "1h" => QueryTimeframe::Hour1,
            "7d" => QueryTimeframe::Days7,
            "30d" => QueryTimeframe::Days30,
            _ => QueryTimeframe::Hours24,
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            QueryTimeframe::Hour1 => now - Duration::hours(1),
            QueryTimeframe::Hours24 => now - Duration::hours(24),
            QueryTimeframe::Days7 => now - Duration::days(7),
            QueryTimeframe::Days30 => now - Duration::days(30),
        }
    }

    pub fn human_phrase(&self) -> &'static str {
        match self {
            QueryTimeframe::Hour1 => "in the last hour",
            QueryTimeframe::Hours24 => "in the last 24 hours",
            QueryTimeframe::Days7 => "in the last week",
            QueryTimeframe::Days30 => "in the last month",
        }
    }
}

impl Serialize for QueryTimeframe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A classified query, as produced by the intent parser (or any upstream
/// classifier honoring the same shape).
#[derive(Debug, Clone, Serialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub kind: IntentKind,
    pub confidence: f64,
    pub cryptocurrencies: Vec<String>,
    pub timeframe: QueryTimeframe,
    pub original_query: String,
}

/// Caller-supplied retrieval filters, normalized.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueryFilters {
    pub timeframe: QueryTimeframe,
    pub min_confidence: f64,
    pub limit: i64,
}

impl Default for QueryFilters {
    fn default() -> Self {
        Self {
            timeframe: QueryTimeframe::default(),
            min_confidence: 0.7,
            limit: 10,
        }
    }
}

impl QueryFilters {
    /// Clamp the limit into [1, MAX_RESULT_LIMIT].
    pub fn normalized(mut self) -> Self {
        self.limit = self.limit.clamp(1, MAX_RESULT_LIMIT);
        self
    }
}

/// Retrieval of derived records for a classified intent. Result rows are
/// already shaped for the response envelope.
#[async_trait]
pub trait QueryGateway: Send + Sync {
    async fn results_for_intent(
        &self,
        intent: &Intent,
        filters: &QueryFilters,
    ) -> Result<Vec<serde_json::Value>>;

    /// Analytics logging; failures must never fail the request.
    async fn log_query(
        &self,
        query_text: &str,
        intent: &Intent,
        result_count: usize,
        execution_time_ms: i64,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_cutoffs() {
        let now = Utc::now();
        assert_eq!(QueryTimeframe::Hour1.cutoff(now), now - Duration::hours(1));
        assert_eq!(QueryTimeframe::Hours24.cutoff(now), now - Duration::hours(24));
        assert_eq!(QueryTimeframe::Days7.cutoff(now), now - Duration::days(7));
        assert_eq!(QueryTimeframe::Days30.cutoff(now), now - Duration::days(30));
    }

    #[test]
    fn unknown_timeframe_defaults_to_24h() {
        assert_eq!(QueryTimeframe::parse_or_default("6h"), QueryTimeframe::Hours24);
        assert_eq!(QueryTimeframe::parse_or_default("7d"), QueryTimeframe::Days7);
    }

    #[test]
    fn limit_is_capped_at_fifty() {
        let filters = QueryFilters {
            limit: 500,
            ..Default::default()
        }
        .normalized();
        assert_eq!(filters.limit, 50);

        let filters = QueryFilters {
            limit: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(filters.limit, 1);
    }

    #[test]
    fn intent_serializes_with_wire_names() {
        let intent = Intent {
            kind: IntentKind::PumpAndDump,
            confidence: 0.7,
            cryptocurrencies: vec!["BTC".to_string()],
            timeframe: QueryTimeframe::Days7,
            original_query: "pump and dump for BTC this week".to_string(),
        };
        let value = serde_json::to_value(&intent).unwrap();
        assert_eq!(value["type"], "pump_and_dump");
        assert_eq!(value["timeframe"], "7d");
    }
}
