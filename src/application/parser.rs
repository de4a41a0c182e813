//! Keyword intent parser for the query surface. Scores each intent by
//! keyword hits (0.2) and phrase-proximity hits (0.3), capped at 1.0, and
//! extracts symbols and a timeframe from the text. This is adapter plumbing
//! in front of the interpreter; anything honoring the `Intent` shape can
//! replace it.

use crate::application::query::{Intent, IntentKind, QueryTimeframe};

const KEYWORD_SCORE: f64 = 0.2;
const PHRASE_SCORE: f64 = 0.3;
/// Maximum characters allowed between the two halves of a phrase.
const PHRASE_GAP: usize = 10;

struct IntentPattern {
    kind: IntentKind,
    keywords: &'static [&'static str],
    /// Stems scored like phrases ("manipulat" matches any inflection).
    stems: &'static [&'static str],
    /// Ordered word pairs that must appear near each other.
    phrases: &'static [(&'static str, &'static str)],
}

const PATTERNS: &[IntentPattern] = &[
    IntentPattern {
        kind: IntentKind::PumpAndDump,
        keywords: &["pump", "dump", "spike", "manipulation", "scam", "suspicious"],
        stems: &["manipulat"],
        phrases: &[
            ("pump", "dump"),
            ("price", "spike"),
            ("suspicious", "activity"),
            ("scam", "coin"),
        ],
    },
    IntentPattern {
        kind: IntentKind::BottomedOut,
        keywords: &["bottom", "bottomed", "low", "recovery", "rebound", "reversal"],
        stems: &[],
        phrases: &[
            ("bottom", "out"),
            ("hit", "bottom"),
            ("recover", "low"),
            ("trend", "reversal"),
            ("bouncing", "back"),
        ],
    },
    IntentPattern {
        kind: IntentKind::Uptrend,
        keywords: &["up", "rising", "bullish", "increasing", "growing", "gain"],
        stems: &[],
        phrases: &[
            ("going", "up"),
            ("price", "rising"),
            ("bullish", "trend"),
            ("upward", "trend"),
            ("gaining", "momentum"),
        ],
    },
    IntentPattern {
        kind: IntentKind::Downtrend,
        keywords: &["down", "falling", "bearish", "declining", "losing", "drop"],
        stems: &[],
        phrases: &[
            ("going", "down"),
            ("price", "falling"),
            ("bearish", "trend"),
            ("downward", "trend"),
            ("losing", "value"),
        ],
    },
    IntentPattern {
        kind: IntentKind::HighVolatility,
        keywords: &["volatile", "volatility", "unstable", "swinging", "fluctuat"],
        stems: &[],
        phrases: &[
            ("high", "volatility"),
            ("very", "volatile"),
            ("price", "swings"),
            ("unstable", "price"),
        ],
    },
    IntentPattern {
        kind: IntentKind::VolumeSpike,
        keywords: &["volume", "trading", "activity", "unusual"],
        stems: &[],
        phrases: &[
            ("volume", "spike"),
            ("high", "volume"),
            ("unusual", "activity"),
            ("trading", "volume"),
        ],
    },
    IntentPattern {
        kind: IntentKind::Trending,
        keywords: &["trend", "trending", "popular", "hot", "active"],
        stems: &[],
        phrases: &[
            ("what", "trending"),
            ("most", "active"),
            ("popular", "coin"),
            ("hot", "crypto"),
        ],
    },
    IntentPattern {
        kind: IntentKind::Performance,
        keywords: &["perform", "best", "worst", "top", "leader"],
        stems: &[],
        phrases: &[
            ("best", "perform"),
            ("worst", "perform"),
            ("top", "coin"),
            ("market", "leader"),
        ],
    },
];

const NAME_ALIASES: &[(&str, &str)] = &[
    ("bitcoin", "BTC"),
    ("btc", "BTC"),
    ("ethereum", "ETH"),
    ("eth", "ETH"),
    ("cardano", "ADA"),
    ("ada", "ADA"),
    ("solana", "SOL"),
    ("sol", "SOL"),
    ("polkadot", "DOT"),
    ("dot", "DOT"),
];

const TIMEFRAME_PHRASES: &[(QueryTimeframe, &[&str])] = &[
    (
        QueryTimeframe::Hour1,
        &["1 hour", "one hour", "past hour", "last hour"],
    ),
    (
        QueryTimeframe::Hours24,
        &["24 hour", "1 day", "today", "daily"],
    ),
    (
        QueryTimeframe::Days7,
        &["7 day", "1 week", "weekly", "past week", "this week"],
    ),
    (
        QueryTimeframe::Days30,
        &["30 day", "1 month", "monthly", "past month", "this month"],
    ),
];

#[derive(Debug, Default)]
pub struct IntentParser;

impl IntentParser {
    pub fn new() -> Self {
        Self
    }

    /// Classify a free-text question. `None` when nothing scores.
    pub fn parse(&self, query_text: &str) -> Option<Intent> {
        let lower = query_text.to_lowercase();

        let mut best: Option<(IntentKind, f64)> = None;
        for pattern in PATTERNS {
            let score = score_pattern(&lower, pattern);
            if score > 0.0 && best.is_none_or(|(_, s)| score > s) {
                best = Some((pattern.kind, score));
            }
        }
        let (kind, confidence) = best?;

        Some(Intent {
            kind,
            confidence: (confidence * 1000.0).round() / 1000.0,
            cryptocurrencies: extract_symbols(query_text),
            timeframe: extract_timeframe(&lower),
            original_query: query_text.to_string(),
        })
    }

    /// Human-readable restatement of what will be retrieved.
    pub fn interpretation(&self, intent: &Intent) -> String {
        let mut parts = vec![intent.kind.description().to_string()];
        if !intent.cryptocurrencies.is_empty() {
            parts.push(format!(
                "specifically for {}",
                intent.cryptocurrencies.join(", ")
            ));
        }
        parts.push(intent.timeframe.human_phrase().to_string());
        parts.join(" ")
    }
}

fn score_pattern(lower: &str, pattern: &IntentPattern) -> f64 {
    let mut score = 0.0;
    for keyword in pattern.keywords {
        if lower.contains(keyword) {
            score += KEYWORD_SCORE;
        }
    }
    for stem in pattern.stems {
        if lower.contains(stem) {
            score += PHRASE_SCORE;
        }
    }
    for (first, second) in pattern.phrases {
        if near(lower, first, second, PHRASE_GAP) {
            score += PHRASE_SCORE;
        }
    }
    score.min(1.0)
}

/// True when `second` starts within `gap` bytes after some occurrence of
/// `first`. Byte-based so arbitrary user input cannot split a char
/// boundary.
fn near(haystack: &str, first: &str, second: &str, gap: usize) -> bool {
    let hay = haystack.as_bytes();
    let a = first.as_bytes();
    let b = second.as_bytes();
    let mut from = 0;
    while let Some(pos) = find_bytes(&hay[from..], a) {
        let after = from + pos + a.len();
        let end = (after + gap + b.len()).min(hay.len());
        if let Some(rel) = find_bytes(&hay[after..end], b)
            && rel <= gap
        {
            return true;
        }
        from = after;
    }
    false
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Uppercase ticker tokens (2-10 chars, optionally $-prefixed) plus common
/// coin names, first occurrence order, deduplicated.
fn extract_symbols(query_text: &str) -> Vec<String> {
    let mut symbols = Vec::new();
    let mut push = |symbol: String| {
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    };

    for raw in query_text.split(|c: char| !c.is_alphanumeric() && c != '$') {
        let token = raw.strip_prefix('$').unwrap_or(raw);
        if (2..=10).contains(&token.len())
            && token.chars().all(|c| c.is_ascii_uppercase())
        {
            push(token.to_string());
        } else {
            let lower = token.to_lowercase();
            if let Some((_, symbol)) = NAME_ALIASES.iter().find(|(name, _)| *name == lower) {
                push((*symbol).to_string());
            }
        }
    }
    symbols
}

fn extract_timeframe(lower: &str) -> QueryTimeframe {
    for (timeframe, phrases) in TIMEFRAME_PHRASES {
        if phrases.iter().any(|p| lower.contains(p)) {
            return *timeframe;
        }
    }
    QueryTimeframe::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_the_canonical_examples() {
        let parser = IntentParser::new();
        let cases = [
            ("Show me pump and dump signals", IntentKind::PumpAndDump),
            ("Which coins have bottomed out?", IntentKind::BottomedOut),
            ("Show me coins with a bullish trend", IntentKind::Uptrend),
            ("Which coins are losing value?", IntentKind::Downtrend),
            ("Which coins are most volatile?", IntentKind::HighVolatility),
            ("prices are fluctuating", IntentKind::HighVolatility),
            ("Show unusual volume activity", IntentKind::VolumeSpike),
            ("What's trending now?", IntentKind::Trending),
            ("Show me the best performers", IntentKind::Performance),
        ];
        for (text, expected) in cases {
            let intent = parser.parse(text).unwrap_or_else(|| panic!("no intent for {text:?}"));
            assert_eq!(intent.kind, expected, "query: {text}");
            assert!(intent.confidence > 0.0 && intent.confidence <= 1.0);
        }
    }

    #[test]
    fn gibberish_yields_no_intent() {
        assert!(IntentParser::new().parse("xylophone quartet rehearsal").is_none());
    }

    #[test]
    fn extracts_symbols_and_aliases() {
        let parser = IntentParser::new();
        let intent = parser.parse("Is $BTC or ethereum pumping today?").unwrap();
        assert_eq!(intent.cryptocurrencies, vec!["BTC", "ETH"]);
        assert_eq!(intent.timeframe, QueryTimeframe::Hours24);
    }

    #[test]
    fn extracts_timeframes() {
        let parser = IntentParser::new();
        let weekly = parser.parse("pump and dump over the past week").unwrap();
        assert_eq!(weekly.timeframe, QueryTimeframe::Days7);
        let monthly = parser.parse("pump and dump in the last 30 days").unwrap();
        assert_eq!(monthly.timeframe, QueryTimeframe::Days30);
        let hourly = parser.parse("pump and dump in the past hour").unwrap();
        assert_eq!(hourly.timeframe, QueryTimeframe::Hour1);
        // No timeframe phrase: default.
        let plain = parser.parse("show me pump and dump").unwrap();
        assert_eq!(plain.timeframe, QueryTimeframe::Hours24);
    }

    #[test]
    fn phrase_proximity_requires_a_small_gap() {
        assert!(near("pump and dump", "pump", "dump", 10));
        assert!(!near(
            "pump everything then much later dump it",
            "pump",
            "dump",
            10
        ));
        assert!(near("pumpdump", "pump", "dump", 10));
    }

    #[test]
    fn interpretation_mentions_symbols_and_window() {
        let parser = IntentParser::new();
        let intent = parser.parse("Is BTC in an upward trend this week?").unwrap();
        let text = parser.interpretation(&intent);
        assert!(text.contains("BTC"));
        assert!(text.contains("in the last week"));
    }
}
