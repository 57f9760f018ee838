//! libSQL backend: `DataSource` over a local SQLite-compatible database.
//!
//! Supports local file and in-memory databases. Each batch call runs in its
//! own transaction so a failed write-back leaves the table untouched.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::expr::Value;
use crate::store::traits::{DataSource, Record, Row, RowId};

/// libSQL data source.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlSource {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlSource {
    /// Open an existing local database file.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if !path.exists() {
            return Err(DatabaseError::Pool(format!(
                "Database file {} does not exist",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Run arbitrary DDL/DML, e.g. to seed a test database.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(sql)
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Double-quote an identifier, escaping embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql_value(value: &Value) -> libsql::Value {
    match value {
        Value::None => libsql::Value::Null,
        Value::Bool(b) => libsql::Value::Integer(*b as i64),
        Value::Int(n) => libsql::Value::Integer(*n),
        Value::Float(x) => libsql::Value::Real(*x),
        Value::Str(s) => libsql::Value::Text(s.clone()),
        // Lists have no column type; store their display form.
        Value::List(_) => libsql::Value::Text(value.to_string()),
    }
}

fn from_sql_value(value: libsql::Value) -> Value {
    match value {
        libsql::Value::Null => Value::None,
        libsql::Value::Integer(n) => Value::Int(n),
        libsql::Value::Real(x) => Value::Float(x),
        libsql::Value::Text(s) => Value::Str(s),
        libsql::Value::Blob(bytes) => Value::Str(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

fn insert_statement(table: &str, record: &Record) -> (String, Vec<libsql::Value>) {
    if record.is_empty() {
        return (format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table)), Vec::new());
    }
    let columns: Vec<String> = record.iter().map(|(k, _)| quote_ident(k)).collect();
    let placeholders: Vec<String> = (1..=record.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    );
    let params = record.iter().map(|(_, v)| to_sql_value(v)).collect();
    (sql, params)
}

fn update_statement(table: &str, id: RowId, fields: &Record) -> (String, Vec<libsql::Value>) {
    let assignments: Vec<String> = fields
        .iter()
        .enumerate()
        .map(|(i, (k, _))| format!("{} = ?{}", quote_ident(k), i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE \"id\" = ?{}",
        quote_ident(table),
        assignments.join(", "),
        fields.len() + 1
    );
    let mut params: Vec<libsql::Value> = fields.iter().map(|(_, v)| to_sql_value(v)).collect();
    params.push(libsql::Value::Integer(id));
    (sql, params)
}

// ── DataSource impl ─────────────────────────────────────────────────

#[async_trait]
impl DataSource for LibSqlSource {
    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let columns: Vec<String> = (0..rows.column_count())
            .map(|i| rows.column_name(i).unwrap_or_default().to_string())
            .collect();

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            let mut record = Record::new();
            for (i, name) in columns.iter().enumerate() {
                let value = row
                    .get_value(i as i32)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
                record.insert(name.clone(), from_sql_value(value));
            }
            out.push(record);
        }
        debug!(rows = out.len(), "Query returned");
        Ok(out)
    }

    async fn batch_insert(&self, table: &str, records: &[Record]) -> Result<(), DatabaseError> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        for record in records {
            let (sql, params) = insert_statement(table, record);
            if let Err(e) = tx.execute(&sql, params).await {
                tx.rollback().await.ok();
                return Err(DatabaseError::Query(format!("INSERT into {table} failed: {e}")));
            }
        }
        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        info!(table, count = records.len(), "Inserted records");
        Ok(())
    }

    async fn batch_update(
        &self,
        table: &str,
        updates: &[(RowId, Record)],
    ) -> Result<(), DatabaseError> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        for (id, fields) in updates {
            if fields.is_empty() {
                continue;
            }
            let (sql, params) = update_statement(table, *id, fields);
            if let Err(e) = tx.execute(&sql, params).await {
                tx.rollback().await.ok();
                return Err(DatabaseError::Query(format!("UPDATE of {table} failed: {e}")));
            }
        }
        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        info!(table, count = updates.len(), "Updated records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlSource {
        let db = LibSqlSource::new_memory().await.unwrap();
        db.execute_batch(
            "CREATE TABLE People (id INTEGER PRIMARY KEY, name TEXT, joined INTEGER, greeted INTEGER DEFAULT 0);
             INSERT INTO People (id, name, joined) VALUES (1, 'Ada', 2015), (2, 'Grace', 2019), (3, 'Linus', 2021);
             CREATE TABLE Log (person INTEGER, note TEXT);",
        )
        .await
        .unwrap();
        db
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("Weird\"Name"), "\"Weird\"\"Name\"");
    }

    #[test]
    fn update_statement_binds_id_last() {
        let (sql, params) = update_statement("People", 9, &Record::new().with("greeted", true));
        assert_eq!(sql, "UPDATE \"People\" SET \"greeted\" = ?1 WHERE \"id\" = ?2");
        assert_eq!(params.len(), 2);
    }

    #[tokio::test]
    async fn query_returns_rows_in_order_with_column_names() {
        let db = test_db().await;
        let rows = db
            .execute_query("SELECT id, name FROM People WHERE joined < 2020 ORDER BY id")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id(), Some(1));
        assert_eq!(rows[1].get("name"), Some(&Value::from("Grace")));
    }

    #[tokio::test]
    async fn batch_update_writes_each_row() {
        let db = test_db().await;
        let updates = vec![
            (1, Record::new().with("greeted", true)),
            (2, Record::new().with("greeted", true)),
        ];
        db.batch_update("People", &updates).await.unwrap();

        let rows = db
            .execute_query("SELECT id FROM People WHERE greeted = 1 ORDER BY id")
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn batch_insert_appends_records() {
        let db = test_db().await;
        let records = vec![
            Record::new().with("person", 1i64).with("note", "welcome"),
            Record::new().with("person", 2i64).with("note", "welcome"),
        ];
        db.batch_insert("Log", &records).await.unwrap();

        let rows = db.execute_query("SELECT person, note FROM Log").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("person"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_the_batch() {
        let db = test_db().await;
        let records = vec![
            Record::new().with("person", 1i64),
            Record::new().with("no_such_column", 1i64),
        ];
        assert!(db.batch_insert("Log", &records).await.is_err());
        let rows = db.execute_query("SELECT * FROM Log").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = LibSqlSource::new_local(&dir.path().join("absent.db")).await;
        assert!(matches!(result, Err(DatabaseError::Pool(_))));
    }
}
