// In-process backend with PostgREST semantics, used for tests and offline runs

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use super::query::{Filter, Operation, PostgrestError, Query, QueryResponse, Row, TableBackend};

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
}

impl Table {
    fn next_id(&self, id_column: &str) -> i64 {
        self.rows
            .iter()
            .filter_map(|r| r.get(id_column).and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1
    }
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    pending_failure: Option<PostgrestError>,
}

pub struct MemoryBackend {
    state: Mutex<State>,
    id_column: String,
}

impl MemoryBackend {
    /// A backend exposing the given (empty) tables.
    pub fn with_tables(tables: &[&str]) -> Self {
        let tables = tables
            .iter()
            .map(|name| (name.to_string(), Table::default()))
            .collect();
        Self {
            state: Mutex::new(State {
                tables,
                pending_failure: None,
            }),
            id_column: "id".to_string(),
        }
    }

    /// Column the backend assigns ids into on insert.
    pub fn with_id_column(mut self, column: &str) -> Self {
        self.id_column = column.to_string();
        self
    }

    /// Replace the contents of `table` (creating it if needed).
    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        let mut state = self.lock();
        state.tables.entry(table.to_string()).or_default().rows = rows;
    }

    /// Make the next call fail with `message`, whatever it is.
    pub fn fail_next(&self, message: &str) {
        self.lock().pending_failure = Some(PostgrestError::new(message));
    }

    /// Snapshot of the rows currently stored in `table`.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(&self, query: &Query) -> Result<(u16, Vec<Row>), (u16, PostgrestError)> {
        let mut state = self.lock();
        if let Some(error) = state.pending_failure.take() {
            return Err((400, error));
        }

        let table = state.tables.get_mut(&query.table).ok_or_else(|| {
            (
                404,
                PostgrestError::new(format!("relation \"public.{}\" does not exist", query.table))
                    .with_code("42P01"),
            )
        })?;

        match &query.operation {
            Operation::Select { columns } => {
                let rows = table
                    .rows
                    .iter()
                    .filter(|r| matches_all(r, &query.filters))
                    .map(|r| project(r, columns))
                    .collect();
                Ok((200, rows))
            }
            Operation::Insert { rows } => {
                let mut inserted = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut row = row.clone();
                    if row.get(&self.id_column).map_or(true, Value::is_null) {
                        let id = table.next_id(&self.id_column);
                        row.insert(self.id_column.clone(), Value::from(id));
                    }
                    table.rows.push(row.clone());
                    inserted.push(row);
                }
                Ok((201, inserted))
            }
            Operation::Update { values } => {
                let mut updated = Vec::new();
                for row in table.rows.iter_mut().filter(|r| matches_all(r, &query.filters)) {
                    for (column, value) in values {
                        row.insert(column.clone(), value.clone());
                    }
                    updated.push(row.clone());
                }
                Ok((200, updated))
            }
            Operation::Delete => {
                let (removed, kept): (Vec<Row>, Vec<Row>) = table
                    .rows
                    .drain(..)
                    .partition(|r| matches_all(r, &query.filters));
                table.rows = kept;
                Ok((200, removed))
            }
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        // Query-string filters arrive as text; compare against the column's rendering.
        (Value::Number(x), Value::String(s)) | (Value::String(s), Value::Number(x)) => {
            x.to_string() == *s
        }
        _ => a == b,
    }
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| {
        row.get(&f.column)
            .map_or(false, |v| values_equal(v, &f.value))
    })
}

fn project(row: &Row, columns: &str) -> Row {
    let columns = columns.trim();
    if columns.is_empty() || columns == "*" {
        return row.clone();
    }
    columns
        .split(',')
        .map(str::trim)
        .filter_map(|c| row.get(c).map(|v| (c.to_string(), v.clone())))
        .collect()
}

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn execute(&self, query: &Query) -> QueryResponse {
        let (status, rows) = match self.run(query) {
            Ok(result) => result,
            Err((status, error)) => return QueryResponse::failed(status, error),
        };

        if query.single {
            if rows.len() != 1 {
                return QueryResponse::failed(
                    406,
                    PostgrestError::new("JSON object requested, multiple (or no) rows returned")
                        .with_code("PGRST116")
                        .with_details(format!("The result contains {} rows", rows.len())),
                );
            }
            let row = rows.into_iter().next().map(Value::Object).unwrap_or(Value::Null);
            return QueryResponse::ok(status, row);
        }

        QueryResponse::ok(status, Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}
