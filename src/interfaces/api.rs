//! Read-path adapter: turns a raw request body into a structured response
//! envelope. Never panics a request; every failure maps to a stable error
//! code.

use crate::application::parser::IntentParser;
use crate::application::query::{Intent, QueryFilters, QueryGateway, QueryTimeframe};
use crate::domain::errors::QueryError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{error, info, warn};

pub const API_VERSION: &str = "1.0.0";

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filters: RequestFilters,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestFilters {
    pub timeframe: Option<String>,
    pub min_confidence: Option<f64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub data: Option<QueryData>,
    pub meta: ResponseMeta,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct QueryData {
    pub intent: Intent,
    pub interpretation: String,
    pub results: Vec<Value>,
    pub total_matches: usize,
    pub filters_applied: QueryFilters,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    pub execution_time_ms: i64,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// Process one read request end to end: parse, classify, retrieve, envelope.
pub async fn handle_query(raw_body: Option<&str>, gateway: &dyn QueryGateway) -> QueryResponse {
    let started = Instant::now();
    match process(raw_body, gateway, started).await {
        Ok(response) => response,
        Err(e) => {
            match &e {
                QueryError::Internal(source) => {
                    error!(error = %format!("{source:#}"), "query processing failed")
                }
                other => warn!(code = other.code(), "query rejected"),
            }
            QueryResponse {
                success: false,
                data: None,
                meta: meta(started),
                error: Some(ErrorBody {
                    code: e.code(),
                    message: e.to_string(),
                }),
            }
        }
    }
}

async fn process(
    raw_body: Option<&str>,
    gateway: &dyn QueryGateway,
    started: Instant,
) -> Result<QueryResponse, QueryError> {
    let body = raw_body
        .filter(|b| !b.trim().is_empty())
        .ok_or(QueryError::MissingBody)?;
    let request: QueryRequest = serde_json::from_str(body).map_err(QueryError::InvalidJson)?;

    let query_text = request.query.trim();
    if query_text.is_empty() {
        return Err(QueryError::EmptyQuery);
    }

    let filters = QueryFilters {
        timeframe: request
            .filters
            .timeframe
            .as_deref()
            .map(QueryTimeframe::parse_or_default)
            .unwrap_or_default(),
        min_confidence: request.filters.min_confidence.unwrap_or(0.7),
        limit: request.filters.limit.unwrap_or(10),
    }
    .normalized();

    let parser = IntentParser::new();
    let intent = parser.parse(query_text).ok_or(QueryError::UnsupportedIntent)?;
    info!(intent = intent.kind.as_str(), query = query_text, "query intent detected");

    let results = gateway
        .results_for_intent(&intent, &filters)
        .await
        .map_err(QueryError::Internal)?;

    let execution_time_ms = started.elapsed().as_millis() as i64;
    // Analytics only; a logging failure never fails the request.
    if let Err(e) = gateway
        .log_query(query_text, &intent, results.len(), execution_time_ms)
        .await
    {
        warn!(error = %format!("{e:#}"), "failed to log query");
    }

    let interpretation = parser.interpretation(&intent);
    Ok(QueryResponse {
        success: true,
        data: Some(QueryData {
            interpretation,
            total_matches: results.len(),
            results,
            intent,
            filters_applied: filters,
        }),
        meta: meta(started),
        error: None,
    })
}

fn meta(started: Instant) -> ResponseMeta {
    ResponseMeta {
        timestamp: Utc::now().to_rfc3339(),
        execution_time_ms: started.elapsed().as_millis() as i64,
        version: API_VERSION,
    }
}
