// Query model and fluent builder shared by every remote backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// An untyped table row: column name to scalar value.
pub type Row = Map<String, Value>;

/// Error object returned by PostgREST alongside (or instead of) data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PostgrestError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl PostgrestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for PostgrestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// The `{data, error}` pair every remote call resolves to.
///
/// Exactly one of `data` / `error` is meaningful: a response with an error
/// never carries usable data. `data` may be `None` on success when the
/// server returned an empty body.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub data: Option<Value>,
    pub error: Option<PostgrestError>,
    pub status: u16,
}

impl QueryResponse {
    pub fn ok(status: u16, data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
            status,
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            data: None,
            error: None,
            status,
        }
    }

    pub fn failed(status: u16, error: PostgrestError) -> Self {
        Self {
            data: None,
            error: Some(error),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Select { columns: String },
    Insert { rows: Vec<Row> },
    Update { values: Row },
    Delete,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Select { .. } => "select",
            Operation::Insert { .. } => "insert",
            Operation::Update { .. } => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Equality filter on a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    /// Value as it appears after `eq.` in a PostgREST query string.
    pub fn encoded_value(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub operation: Operation,
    pub filters: Vec<Filter>,
    /// Coerce the result to exactly one row (error on zero or many).
    pub single: bool,
}

impl Query {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            operation: Operation::Select {
                columns: "*".to_string(),
            },
            filters: Vec::new(),
            single: false,
        }
    }
}

/// Anything that can run a [`Query`] against a set of remote tables.
///
/// Implementations never return a Rust error: transport and server
/// failures are reported through [`QueryResponse::error`].
#[async_trait]
pub trait TableBackend: Send + Sync {
    async fn execute(&self, query: &Query) -> QueryResponse;

    /// Start building a query against `table`.
    fn from(self: Arc<Self>, table: &str) -> QueryBuilder
    where
        Self: Sized + 'static,
    {
        QueryBuilder::new(self, table)
    }
}

/// Fluent builder mirroring `client.from(table).select(..).eq(..).single()`.
#[derive(Clone)]
pub struct QueryBuilder {
    backend: Arc<dyn TableBackend>,
    query: Query,
}

impl QueryBuilder {
    pub fn new(backend: Arc<dyn TableBackend>, table: &str) -> Self {
        Self {
            backend,
            query: Query::new(table),
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.query.operation = Operation::Select {
            columns: columns.to_string(),
        };
        self
    }

    pub fn insert(mut self, rows: Vec<Row>) -> Self {
        self.query.operation = Operation::Insert { rows };
        self
    }

    pub fn update(mut self, values: Row) -> Self {
        self.query.operation = Operation::Update { values };
        self
    }

    pub fn delete(mut self) -> Self {
        self.query.operation = Operation::Delete;
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.query.filters.push(Filter {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn single(mut self) -> Self {
        self.query.single = true;
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub async fn execute(self) -> QueryResponse {
        log::trace!(
            "{} on {} ({} filters, single={})",
            self.query.operation.name(),
            self.query.table,
            self.query.filters.len(),
            self.query.single
        );
        self.backend.execute(&self.query).await
    }
}

/// `from` for a type-erased backend handle.
pub fn from_table(backend: &Arc<dyn TableBackend>, table: &str) -> QueryBuilder {
    QueryBuilder::new(backend.clone(), table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl TableBackend for Echo {
        async fn execute(&self, query: &Query) -> QueryResponse {
            QueryResponse::ok(200, json!({ "table": query.table, "filters": query.filters.len() }))
        }
    }

    #[test]
    fn builder_accumulates_filters_and_single() {
        let backend: Arc<dyn TableBackend> = Arc::new(Echo);
        let builder = from_table(&backend, "foos").select("*").eq("id", 7).single();
        let query = builder.query();

        assert_eq!(query.table, "foos");
        assert!(query.single);
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].column, "id");
        assert_eq!(query.filters[0].value, json!(7));
    }

    #[test]
    fn later_operation_replaces_earlier_one() {
        let backend: Arc<dyn TableBackend> = Arc::new(Echo);
        let builder = from_table(&backend, "bars").select("id").delete();
        assert_eq!(builder.query().operation, Operation::Delete);
    }

    #[test]
    fn filter_values_encode_without_json_quotes() {
        let text = Filter {
            column: "title".into(),
            value: json!("Launch"),
        };
        let number = Filter {
            column: "id".into(),
            value: json!(42),
        };
        assert_eq!(text.encoded_value(), "Launch");
        assert_eq!(number.encoded_value(), "42");
    }

    #[tokio::test]
    async fn execute_reaches_the_backend() {
        let backend = Arc::new(Echo);
        let response = backend.from("venues").eq("id", 1).execute().await;
        assert_eq!(response.data, Some(json!({ "table": "venues", "filters": 1 })));
        assert!(response.error.is_none());
    }
}
