// Unwraps `{data, error}` responses into plain results

use serde_json::Value;
use std::fmt;
use std::future::Future;

use super::query::QueryResponse;

/// The one failure every hook surfaces: a remote call reported an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for QueryError {}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        QueryError::new(format!("Parse error: {}", e))
    }
}

/// Await a pending remote query and return its data payload.
///
/// An error response is logged once here and turned into a [`QueryError`]
/// carrying the remote message verbatim. A successful response with no body
/// yields `Value::Null`.
pub async fn from_supabase<F>(query: F) -> Result<Value, QueryError>
where
    F: Future<Output = QueryResponse>,
{
    let QueryResponse { data, error, .. } = query.await;
    if let Some(error) = error {
        log::error!("{}", error.message);
        return Err(QueryError::new(error.message));
    }
    Ok(data.unwrap_or(Value::Null))
}
