use thiserror::Error;

/// Errors surfaced by the read path. Each maps to a stable wire code so the
/// query adapter can return a structured envelope instead of crashing the
/// request.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Request body is required")]
    MissingBody,

    #[error("Invalid JSON in request body")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Query text is required")]
    EmptyQuery,

    #[error("Could not understand the query intent")]
    UnsupportedIntent,

    #[error("An error occurred while processing your query")]
    Internal(anyhow::Error),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::MissingBody => "MISSING_BODY",
            QueryError::InvalidJson(_) => "INVALID_JSON",
            QueryError::EmptyQuery => "EMPTY_QUERY",
            QueryError::UnsupportedIntent => "UNSUPPORTED_INTENT",
            QueryError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
