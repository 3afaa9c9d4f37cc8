//! Storage Layer - target databases for an import
//!
//! [`TargetDatabase`] is the seam the importer writes through. The shipped
//! implementation is SQLite-backed, with tables:
//! - _meta(key, value) for the database name and version
//! - _tables(name, schema) for declared tables
//! - one data table per declared table: (key, value) as JSON text

pub mod key;
pub mod schema;
pub mod sqlite;

pub use key::{KeyPath, PrimaryKey};
pub use sqlite::SqliteDatabase;

use async_trait::async_trait;
use serde_json::Value;
use crate::Result;

/// Declared shape of a target table
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub schema: String,
    pub primary_key: PrimaryKey,
}

impl TableDef {
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        let schema = schema.into();
        let primary_key = PrimaryKey::parse(schema.split(',').next().unwrap_or(""));
        Self {
            name: name.into(),
            schema,
            primary_key,
        }
    }
}

/// Database an export can be imported into
#[async_trait]
pub trait TargetDatabase: Send {
    fn name(&self) -> &str;

    fn version(&self) -> f64;

    fn table(&self, name: &str) -> Option<&TableDef>;

    fn table_names(&self) -> Vec<String>;

    /// Remove every row of a table
    async fn clear(&mut self, table: &str) -> Result<()>;

    /// Insert rows, failing on an existing key. `keys` is given when keys
    /// travel separately from values.
    async fn bulk_add(&mut self, table: &str, values: Vec<Value>, keys: Option<Vec<Value>>) -> Result<()>;

    /// Insert or replace rows
    async fn bulk_put(&mut self, table: &str, values: Vec<Value>, keys: Option<Vec<Value>>) -> Result<()>;

    /// Open an atomic read-write scope over `tables`. It stays open across
    /// any number of awaits until [`commit`](Self::commit) or
    /// [`rollback`](Self::rollback).
    async fn begin_transaction(&mut self, tables: &[String]) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
