//! SQLite-backed engine implementation

use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, types::ValueRef};
use serde_json::Value;

use super::decode::{decode_batches, load_table};
use super::{Engine, EngineConnection, RawRow, ResultSet};
use crate::query::quote_ident;
use crate::{DataError, Result};

/// Embedded engine over a single in-memory SQLite database.
///
/// Registered files become tables. All database work runs on the blocking
/// pool behind one mutex, so queries from concurrent connections are
/// executed one at a time and never interleave on the same statement.
pub struct SqliteEngine {
    db: Arc<Mutex<Connection>>,
}

impl SqliteEngine {
    /// Start a new engine
    pub fn open() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        tracing::info!("Embedded engine started (SQLite {})", rusqlite::version());
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the database on the blocking pool
    async fn with_db<T, F>(db: Arc<Mutex<Connection>>, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock();
            f(&mut *conn)
        })
        .await?
    }
}

impl Drop for SqliteEngine {
    fn drop(&mut self) {
        tracing::info!("Embedded engine shut down");
    }
}

#[async_trait]
impl Engine for SqliteEngine {
    async fn register_file_buffer(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let table = name.to_string();
        let size = bytes.len();

        let rows = Self::with_db(self.db.clone(), move |conn| {
            let (schema, batches) = decode_batches(&bytes)?;
            load_table(conn, &table, &schema, &batches)
        })
        .await?;

        tracing::debug!("Registered '{}' ({} bytes, {} rows)", name, size, rows);
        Ok(())
    }

    async fn drop_file(&self, name: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(name));
        Self::with_db(self.db.clone(), move |conn| {
            conn.execute_batch(&sql)?;
            Ok(())
        })
        .await
    }

    async fn connect(&self) -> Result<Box<dyn EngineConnection>> {
        Ok(Box::new(SqliteConnection {
            db: self.db.clone(),
        }))
    }
}

/// A connection handle onto the shared database
struct SqliteConnection {
    db: Arc<Mutex<Connection>>,
}

#[async_trait]
impl EngineConnection for SqliteConnection {
    async fn query(&mut self, sql: &str) -> Result<ResultSet> {
        let sql = sql.to_string();
        SqliteEngine::with_db(self.db.clone(), move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(|e| DataError::Engine(e.to_string()))?;
            let fields: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let width = fields.len();

            let mut rows = stmt.query([]).map_err(|e| DataError::Engine(e.to_string()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(|e| DataError::Engine(e.to_string()))? {
                let mut values = Vec::with_capacity(width);
                for idx in 0..width {
                    values.push(json_value(row.get_ref(idx)?));
                }
                out.push(RawRow::Positional(values));
            }

            Ok(ResultSet::new(fields, out))
        })
        .await
    }

    async fn columns(&mut self, name: &str) -> Result<Vec<String>> {
        let name = name.to_string();
        SqliteEngine::with_db(self.db.clone(), move |conn| {
            let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
            let names = stmt
                .query_map([&name], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FACTS: &str = "contractor_name,contract_amount\nACME CORP,10\nACME CORP,5.5\nGlobex,1\n";

    #[tokio::test]
    async fn test_register_query_and_columns() {
        let engine = SqliteEngine::open().unwrap();
        engine.register_file_buffer("facts", FACTS.as_bytes().to_vec()).await.unwrap();

        let mut conn = engine.connect().await.unwrap();
        let set = conn
            .query("SELECT contractor_name, SUM(contract_amount) AS total FROM facts GROUP BY 1 ORDER BY 2 DESC")
            .await
            .unwrap();
        assert_eq!(set.schema.fields, vec!["contractor_name", "total"]);

        let rows = set.into_rows();
        assert_eq!(rows[0]["contractor_name"], json!("ACME CORP"));
        assert_eq!(rows[0]["total"], json!(15.5));

        assert_eq!(conn.columns("facts").await.unwrap(), vec!["contractor_name", "contract_amount"]);
        assert!(conn.columns("missing").await.unwrap().is_empty());
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reregistering_replaces_previous_schema() {
        let engine = SqliteEngine::open().unwrap();
        engine.register_file_buffer("facts", FACTS.as_bytes().to_vec()).await.unwrap();
        engine
            .register_file_buffer("facts", b"award_title\nBridge repair\n".to_vec())
            .await
            .unwrap();

        let mut conn = engine.connect().await.unwrap();
        assert_eq!(conn.columns("facts").await.unwrap(), vec!["award_title"]);

        engine.drop_file("facts").await.unwrap();
        assert!(conn.columns("facts").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_query_is_engine_failure() {
        let engine = SqliteEngine::open().unwrap();
        let mut conn = engine.connect().await.unwrap();
        let err = conn.query("SELECT * FROM nowhere").await.unwrap_err();
        assert!(matches!(err, DataError::Engine(_)));
    }
}
