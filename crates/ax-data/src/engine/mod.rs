//! The embedded analytical engine contract.
//!
//! The explorer only needs a narrow surface: register a file buffer under a
//! logical name, open a connection, run query text, and read back column
//! names plus rows. [`SqliteEngine`] implements it over an in-memory SQLite
//! database; other engines can be plugged in through the traits.

mod decode;
mod sqlite;

pub use sqlite::SqliteEngine;

use std::sync::{Arc, Weak};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use ax_core::Row;
use crate::Result;

/// Trait for the engine itself
#[async_trait]
pub trait Engine: Send + Sync {
    /// Make `bytes` queryable as `name`, replacing anything registered under it
    async fn register_file_buffer(&self, name: &str, bytes: Vec<u8>) -> Result<()>;

    /// Forget the file registered as `name`; a no-op if there is none
    async fn drop_file(&self, name: &str) -> Result<()>;

    /// Open a connection for running queries
    async fn connect(&self) -> Result<Box<dyn EngineConnection>>;
}

/// Trait for an open engine connection
#[async_trait]
pub trait EngineConnection: Send {
    /// Run query text and collect the result
    async fn query(&mut self, sql: &str) -> Result<ResultSet>;

    /// Column names of a registered file, in file order
    async fn columns(&mut self, name: &str) -> Result<Vec<String>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Column names of a result, in select-list order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSchema {
    pub fields: Vec<String>,
}

/// A raw row as an engine hands it back
#[derive(Debug, Clone, PartialEq)]
pub enum RawRow {
    /// Values in schema order
    Positional(Vec<Value>),
    /// Values tagged with their column name
    Named(Vec<(String, Value)>),
}

/// Result of one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub schema: ResultSchema,
    rows: Vec<RawRow>,
}

impl ResultSet {
    pub fn new(fields: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self {
            schema: ResultSchema { fields },
            rows,
        }
    }

    /// Rows exactly as the engine returned them
    pub fn to_array(&self) -> &[RawRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Normalize every row to a column-name keyed [`Row`].
    ///
    /// Positional rows are zipped with the schema; named rows are laid out in
    /// schema order with any extra names appended. Schema columns a row lacks
    /// come back as null.
    pub fn into_rows(self) -> Vec<Row> {
        let fields = self.schema.fields;
        self.rows
            .into_iter()
            .map(|raw| match raw {
                RawRow::Positional(values) => {
                    let mut values = values.into_iter();
                    fields
                        .iter()
                        .map(|name| (name.clone(), values.next().unwrap_or(Value::Null)))
                        .collect()
                }
                RawRow::Named(pairs) => {
                    let mut row: Row = fields.iter().map(|name| (name.clone(), Value::Null)).collect();
                    for (name, value) in pairs {
                        row.insert(name, value);
                    }
                    row
                }
            })
            .collect()
    }
}

/// Owner of the process-wide engine.
///
/// [`acquire`](EngineSlot::acquire) hands out the live engine or starts one;
/// concurrent first calls are serialized, so only one engine is ever started.
/// The engine shuts down when the last handle is dropped, and the next
/// acquire starts a fresh one.
#[derive(Default)]
pub struct EngineSlot {
    live: Mutex<Weak<SqliteEngine>>,
}

impl EngineSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> Result<Arc<SqliteEngine>> {
        let mut live = self.live.lock();
        if let Some(engine) = live.upgrade() {
            return Ok(engine);
        }

        let engine = Arc::new(SqliteEngine::open()?);
        *live = Arc::downgrade(&engine);
        Ok(engine)
    }

    /// Whether an engine is currently running
    pub fn is_live(&self) -> bool {
        self.live.lock().strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_positional_and_named_rows_normalize_alike() {
        let fields = vec!["entity".to_string(), "total_value".to_string()];
        let set = ResultSet::new(
            fields,
            vec![
                RawRow::Positional(vec![json!("ACME CORP"), json!(10.5)]),
                RawRow::Named(vec![
                    ("total_value".to_string(), json!(3.0)),
                    ("entity".to_string(), json!("Globex")),
                ]),
                RawRow::Positional(vec![json!("Short")]),
            ],
        );

        let rows = set.into_rows();
        assert_eq!(rows[0]["entity"], json!("ACME CORP"));
        assert_eq!(rows[1]["entity"], json!("Globex"));
        assert_eq!(rows[1].keys().collect::<Vec<_>>(), vec!["entity", "total_value"]);
        assert_eq!(rows[2]["total_value"], Value::Null);
    }

    #[test]
    fn test_slot_reuses_live_engine_and_restarts_after_teardown() {
        let slot = EngineSlot::new();
        let first = slot.acquire().unwrap();
        let second = slot.acquire().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        drop(first);
        drop(second);
        assert!(!slot.is_live());

        let third = slot.acquire().unwrap();
        assert!(slot.is_live());
        drop(third);
    }
}
