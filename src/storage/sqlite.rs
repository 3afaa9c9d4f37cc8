//! SQLite storage implementation

use std::collections::BTreeMap;
use std::path::Path;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{schema, TableDef, TargetDatabase};
use crate::export::TableSchema;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Fail on an existing key
    Add,
    /// Replace an existing key in place
    Put,
}

/// SQLite-backed target database
pub struct SqliteDatabase {
    conn: Connection,
    name: String,
    version: f64,
    tables: BTreeMap<String, TableDef>,
}

impl SqliteDatabase {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Create a database with the given identity and tables. `None` keeps it
    /// in memory.
    pub fn create(path: Option<&Path>, name: &str, version: f64, tables: &[TableSchema]) -> Result<Self> {
        let mut db = match path {
            Some(path) => Self::open(path)?,
            None => Self::open_in_memory()?,
        };
        db.define(name, version)?;
        for table in tables {
            db.define_table(&table.name, &table.schema)?;
        }
        Ok(db)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }

        let meta = |key: &str| -> Result<Option<String>> {
            conn.query_row("SELECT value FROM _meta WHERE key = ?1", [key], |row| row.get(0))
                .optional()
                .map_err(Into::into)
        };
        let name = meta(schema::META_NAME)?.unwrap_or_default();
        let version = meta(schema::META_VERSION)?
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);

        let mut tables = BTreeMap::new();
        {
            let mut stmt = conn.prepare("SELECT name, schema FROM _tables")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
            for row in rows {
                let (table, schema) = row?;
                tables.insert(table.clone(), TableDef::new(table, schema));
            }
        }

        Ok(Self {
            conn,
            name,
            version,
            tables,
        })
    }

    /// Set the database name and version
    pub fn define(&mut self, name: &str, version: f64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO _meta (key, value) VALUES (?1, ?2)",
            params![schema::META_NAME, name],
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO _meta (key, value) VALUES (?1, ?2)",
            params![schema::META_VERSION, version.to_string()],
        )?;
        self.name = name.to_string();
        self.version = version;
        Ok(())
    }

    /// Declare (or redeclare) a table
    pub fn define_table(&mut self, name: &str, table_schema: &str) -> Result<()> {
        self.conn.execute(&schema::create_data_table(name), [])?;
        self.conn.execute(
            "INSERT OR REPLACE INTO _tables (name, schema) VALUES (?1, ?2)",
            params![name, table_schema],
        )?;
        self.tables.insert(name.to_string(), TableDef::new(name, table_schema));
        Ok(())
    }

    fn def(&self, table: &str) -> Result<&TableDef> {
        self.tables.get(table).ok_or_else(|| Error::MissingTable(table.to_string()))
    }

    /// All `(key, value)` pairs of a table in insertion order
    pub fn rows(&self, table: &str) -> Result<Vec<(Value, Value)>> {
        self.def(table)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT key, value FROM {} ORDER BY rowid",
            schema::data_table(table)
        ))?;
        let raw = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(key, value)| -> Result<(Value, Value)> {
                Ok((serde_json::from_str(&key)?, serde_json::from_str(&value)?))
            })
            .collect()
    }

    /// All values of a table in insertion order
    pub fn values(&self, table: &str) -> Result<Vec<Value>> {
        Ok(self.rows(table)?.into_iter().map(|(_, value)| value).collect())
    }

    /// Look up one value by key
    pub fn get(&self, table: &str, key: &Value) -> Result<Option<Value>> {
        self.def(table)?;
        let raw: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", schema::data_table(table)),
                [key_text(key)],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|v| serde_json::from_str(&v).map_err(Into::into)).transpose()
    }

    /// Count rows in a table
    pub fn count(&self, table: &str) -> Result<usize> {
        self.def(table)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", schema::data_table(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for def in self.tables.values() {
            tables.push(TableStats {
                name: def.name.clone(),
                schema: def.schema.clone(),
                rows: self.count(&def.name)?,
            });
        }
        Ok(DbStats {
            name: self.name.clone(),
            version: self.version,
            tables,
        })
    }

    fn next_auto_key(&self, table: &str) -> Result<i64> {
        let max: Option<i64> = self.conn.query_row(
            &format!("SELECT MAX(CAST(key AS INTEGER)) FROM {}", schema::data_table(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0) + 1)
    }

    fn write(&self, table: &str, values: Vec<Value>, keys: Option<Vec<Value>>, mode: WriteMode) -> Result<()> {
        let def = self.def(table)?;
        if let Some(keys) = &keys {
            if keys.len() != values.len() {
                return Err(Error::Key(format!(
                    "{} keys given for {} values in table {}",
                    keys.len(),
                    values.len(),
                    table
                )));
            }
        }

        let data_table = schema::data_table(table);
        let sql = match mode {
            WriteMode::Add => format!("INSERT INTO {} (key, value) VALUES (?1, ?2)", data_table),
            WriteMode::Put => format!(
                "INSERT INTO {} (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                data_table
            ),
        };
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut keys = keys.map(Vec::into_iter);
        // Next auto-increment key, read from the table once per call
        let mut next_auto: Option<i64> = None;

        for mut value in values {
            let key = match keys.as_mut().and_then(Iterator::next) {
                Some(key) => key,
                None => match def.primary_key.extract(&value) {
                    Some(key) => key,
                    None if def.primary_key.auto_increment => {
                        let next = match next_auto {
                            Some(next) => next,
                            None => self.next_auto_key(table)?,
                        };
                        next_auto = Some(next + 1);
                        let key = Value::from(next);
                        def.primary_key.inject(&mut value, key.clone());
                        key
                    }
                    None => {
                        return Err(Error::Key(format!(
                            "no key for value in table {} (primary key {:?})",
                            table, def.primary_key.src
                        )));
                    }
                },
            };

            if let (Some(next), Some(n)) = (next_auto, key.as_i64()) {
                next_auto = Some(next.max(n.saturating_add(1)));
            }
            let canonical = key_text(&key);
            stmt.execute(params![canonical, value.to_string()]).map_err(|e| match &e {
                rusqlite::Error::SqliteFailure(failure, _)
                    if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Error::DuplicateKey {
                        table: table.to_string(),
                        key: canonical.clone(),
                    }
                }
                _ => Error::Storage(e),
            })?;
        }
        Ok(())
    }
}

/// Canonical text of a key. Integral floats are written as integers so `1`
/// and `1.0` name the same row.
fn key_text(key: &Value) -> String {
    normalize_key(key.clone()).to_string()
}

fn normalize_key(key: Value) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_992.0;
    match key {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE => Value::from(f as i64),
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_key).collect()),
        other => other,
    }
}

#[async_trait]
impl TargetDatabase for SqliteDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> f64 {
        self.version
    }

    fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    async fn clear(&mut self, table: &str) -> Result<()> {
        self.def(table)?;
        self.conn.execute(&format!("DELETE FROM {}", schema::data_table(table)), [])?;
        Ok(())
    }

    async fn bulk_add(&mut self, table: &str, values: Vec<Value>, keys: Option<Vec<Value>>) -> Result<()> {
        self.write(table, values, keys, WriteMode::Add)
    }

    async fn bulk_put(&mut self, table: &str, values: Vec<Value>, keys: Option<Vec<Value>>) -> Result<()> {
        self.write(table, values, keys, WriteMode::Put)
    }

    async fn begin_transaction(&mut self, tables: &[String]) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        tracing::debug!("Transaction opened over {} tables", tables.len());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

/// Per-table statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct TableStats {
    pub name: String,
    pub schema: String,
    pub rows: usize,
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub name: String,
    pub version: f64,
    pub tables: Vec<TableStats>,
}

impl DbStats {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Name: {} (version {})", self.name, self.version)?;
        for table in &self.tables {
            writeln!(f, "  {}: {} rows", table.name, table.rows)?;
        }
        write!(f, "  Total: {} rows", self.total_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_db() -> SqliteDatabase {
        let mut db = SqliteDatabase::open_in_memory().unwrap();
        db.define("library", 1.0).unwrap();
        db.define_table("books", "id,title").unwrap();
        db.define_table("counters", "++id").unwrap();
        db.define_table("notes", "").unwrap();
        db
    }

    #[tokio::test]
    async fn test_bulk_add_and_read_back_in_order() {
        let mut db = sample_db();
        db.bulk_add("books", vec![json!({ "id": 2, "title": "B" }), json!({ "id": 1, "title": "A" })], None)
            .await
            .unwrap();

        let rows = db.rows("books").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, json!(2));
        assert_eq!(rows[1].1, json!({ "id": 1, "title": "A" }));
        assert_eq!(db.get("books", &json!(1)).unwrap(), Some(json!({ "id": 1, "title": "A" })));
    }

    #[tokio::test]
    async fn test_bulk_add_rejects_duplicates() {
        let mut db = sample_db();
        db.bulk_add("books", vec![json!({ "id": 1 })], None).await.unwrap();
        let err = db.bulk_add("books", vec![json!({ "id": 1 })], None).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { ref key, .. } if key == "1"));
    }

    #[tokio::test]
    async fn test_bulk_put_overwrites_in_place() {
        let mut db = sample_db();
        db.bulk_add("books", vec![json!({ "id": 1, "title": "old" }), json!({ "id": 2 })], None)
            .await
            .unwrap();
        db.bulk_put("books", vec![json!({ "id": 1, "title": "new" })], None).await.unwrap();

        let values = db.values("books").unwrap();
        assert_eq!(values, vec![json!({ "id": 1, "title": "new" }), json!({ "id": 2 })]);
    }

    #[tokio::test]
    async fn test_outbound_keys_and_auto_increment() {
        let mut db = sample_db();
        db.bulk_add("notes", vec![json!("a"), json!("b")], Some(vec![json!("k1"), json!("k2")]))
            .await
            .unwrap();
        assert_eq!(db.get("notes", &json!("k2")).unwrap(), Some(json!("b")));

        let err = db.bulk_add("notes", vec![json!("c")], None).await.unwrap_err();
        assert!(matches!(err, Error::Key(_)));

        db.bulk_add("counters", vec![json!({ "n": 1 }), json!({ "id": 10 }), json!({ "n": 2 })], None)
            .await
            .unwrap();
        let values = db.values("counters").unwrap();
        assert_eq!(values[0], json!({ "n": 1, "id": 1 }));
        assert_eq!(values[2], json!({ "n": 2, "id": 11 }));
    }

    #[tokio::test]
    async fn test_auto_increment_batch() {
        let mut db = sample_db();
        db.bulk_add("counters", vec![json!({ "id": 5 })], None).await.unwrap();
        db.bulk_add("counters", vec![json!({}), json!({}), json!({ "id": 20 }), json!({})], None)
            .await
            .unwrap();

        let ids: Vec<i64> = db
            .values("counters")
            .unwrap()
            .iter()
            .filter_map(|v| v["id"].as_i64())
            .collect();
        assert_eq!(ids, vec![5, 6, 7, 20, 21]);
    }

    #[tokio::test]
    async fn test_integral_float_keys() {
        let mut db = sample_db();
        db.bulk_add("notes", vec![json!("one")], Some(vec![json!(1.0)])).await.unwrap();
        assert_eq!(db.get("notes", &json!(1)).unwrap(), Some(json!("one")));

        let err = db.bulk_add("notes", vec![json!("dup")], Some(vec![json!(1)])).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { .. }));

        db.bulk_add("notes", vec![json!("half"), json!("pair")], Some(vec![json!(1.5), json!([2.0, "x"])]))
            .await
            .unwrap();
        assert_eq!(db.get("notes", &json!(1.5)).unwrap(), Some(json!("half")));
        assert_eq!(db.get("notes", &json!([2, "x"])).unwrap(), Some(json!("pair")));
        assert_eq!(db.rows("notes").unwrap()[0].0, json!(1));
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let mut db = sample_db();
        db.bulk_add("books", vec![json!({ "id": 1 })], None).await.unwrap();

        let names = db.table_names();
        db.begin_transaction(&names).await.unwrap();
        db.bulk_add("books", vec![json!({ "id": 2 })], None).await.unwrap();
        db.clear("notes").await.unwrap();
        db.rollback().await.unwrap();
        assert_eq!(db.count("books").unwrap(), 1);

        db.begin_transaction(&[]).await.unwrap();
        db.clear("books").await.unwrap();
        db.commit().await.unwrap();
        assert_eq!(db.count("books").unwrap(), 0);
    }

    #[test]
    fn test_reopen_keeps_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.db");
        {
            let tables = vec![TableSchema::new("books", "++id,title", 0)];
            let db = SqliteDatabase::create(Some(&path), "library", 3.0, &tables).unwrap();
            assert_eq!(db.table_names(), vec!["books".to_string()]);
        }

        let db = SqliteDatabase::open(&path).unwrap();
        assert_eq!(db.name(), "library");
        assert_eq!(db.version(), 3.0);
        let def = db.table("books").unwrap();
        assert_eq!(def.primary_key.src, "++id");
        assert!(def.primary_key.auto_increment);

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_rows(), 0);
        assert!(stats.to_string().contains("books: 0 rows"));
    }
}
