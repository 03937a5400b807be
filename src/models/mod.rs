//! Table names and typed rows for the documented part of the schema.
//!
//! `events` and `venues` have no documented columns and are handled as
//! untyped [`Row`]s.

pub mod bars;
pub mod foos;

pub use bars::{Bar, NewBar};
pub use foos::{Foo, NewFoo};

use serde::Serialize;
use serde_json::Value;

use crate::database::remote::normalize::QueryError;
use crate::database::remote::query::Row;

pub const FOOS: &str = "foos";
pub const BARS: &str = "bars";
pub const EVENTS: &str = "events";
pub const VENUES: &str = "venues";

/// Every table exposed through resource hooks.
pub const TABLES: [&str; 4] = [FOOS, BARS, EVENTS, VENUES];

/// Serialize a typed record into the untyped row shape writes take.
pub fn to_row<T: Serialize>(record: &T) -> Result<Row, QueryError> {
    match serde_json::to_value(record)? {
        Value::Object(row) => Ok(row),
        other => Err(QueryError::new(format!("Expected a row object, got {}", other))),
    }
}
