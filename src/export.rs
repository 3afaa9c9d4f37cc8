//! Export data model
//!
//! The envelope is filled progressively by the stream parser. Header fields
//! are `Option` until they have been parsed; row data arrives in per-table
//! [`RowBuffer`]s held by an index-based [`TableQueue`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of an export format: the marker in `formatName` and the highest
/// `formatVersion` this crate can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    pub name: &'static str,
    pub max_version: u32,
}

impl ExportFormat {
    /// Dexie export format, version 1
    pub const DEXIE: ExportFormat = ExportFormat::new("dexie", 1);

    pub const fn new(name: &'static str, max_version: u32) -> Self {
        Self { name, max_version }
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::DEXIE
    }
}

/// Top-level container of an export, as parsed so far
#[derive(Debug, Default)]
pub struct ExportEnvelope {
    pub format_name: Option<String>,
    pub format_version: Option<u32>,
    pub data: Option<DatabaseExport>,
}

impl ExportEnvelope {
    /// True once every header field the loader needs has been parsed
    pub fn header_ready(&self) -> bool {
        self.format_name.is_some()
            && self.format_version.is_some()
            && self.data.as_ref().is_some_and(|d| {
                d.database_name.is_some() && d.database_version.is_some() && d.tables.is_some()
            })
    }

    /// Pending table queue, if the `data.data` array has been reached
    pub fn queue(&self) -> Option<&TableQueue> {
        self.data.as_ref().and_then(|d| d.data.as_ref())
    }

    pub fn queue_mut(&mut self) -> Option<&mut TableQueue> {
        self.data.as_mut().and_then(|d| d.data.as_mut())
    }
}

/// Database section of an export
#[derive(Debug, Default)]
pub struct DatabaseExport {
    pub database_name: Option<String>,
    pub database_version: Option<f64>,
    pub tables: Option<Vec<TableSchema>>,
    pub data: Option<TableQueue>,
}

/// Manifest entry for one exported table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub name: String,
    pub schema: String,
    #[serde(default)]
    pub row_count: u64,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, schema: impl Into<String>, row_count: u64) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            row_count,
        }
    }

    /// Primary key source: the first comma-separated field of the schema
    pub fn primary_key_src(&self) -> &str {
        self.schema.split(',').next().unwrap_or("").trim()
    }
}

/// Validated, immutable copy of the export header
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportHeader {
    pub format_name: String,
    pub format_version: u32,
    pub database_name: String,
    pub database_version: f64,
    pub tables: Vec<TableSchema>,
}

impl ExportHeader {
    /// Sum of the declared row counts of every table
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.row_count).sum()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Streaming unit for one table's rows
#[derive(Debug, Default)]
pub struct TableExport {
    pub table_name: Option<String>,
    /// Rows carry their own key; otherwise each row is a `[key, value]` pair
    pub inbound: bool,
    pub rows: RowBuffer,
}

/// Rows delivered by the parser and not yet written
#[derive(Debug, Default)]
pub struct RowBuffer {
    rows: Vec<Value>,
    complete: bool,
}

impl RowBuffer {
    pub fn push(&mut self, row: Value) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The source has delivered every row of this table
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// Complete and drained
    pub fn is_finished(&self) -> bool {
        self.complete && self.rows.is_empty()
    }

    /// Move every buffered row out, leaving the same container empty
    pub fn take_batch(&mut self) -> Vec<Value> {
        self.rows.drain(..).collect()
    }

    /// Drop buffered rows and the backing allocation
    fn release(&mut self) {
        self.rows = Vec::new();
    }
}

/// Pending-table queue. Entries are appended by the parser and retired from
/// the front by advancing `head`; indices stay stable for the whole import.
#[derive(Debug, Default)]
pub struct TableQueue {
    entries: Vec<TableExport>,
    head: usize,
}

impl TableQueue {
    pub fn push(&mut self, table: TableExport) {
        self.entries.push(table);
    }

    /// Index of the first pending entry
    pub fn head(&self) -> usize {
        self.head
    }

    /// Total number of entries ever queued, including retired ones
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// No pending entries remain
    pub fn is_drained(&self) -> bool {
        self.head == self.entries.len()
    }

    pub fn get(&self, index: usize) -> Option<&TableExport> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut TableExport> {
        self.entries.get_mut(index)
    }

    /// The entry currently being filled by the parser
    pub fn last_mut(&mut self) -> Option<&mut TableExport> {
        self.entries.last_mut()
    }

    pub fn pending(&self) -> &[TableExport] {
        &self.entries[self.head..]
    }

    /// Retire leading entries that are complete and drained. Returns how many
    /// were retired.
    pub fn retire_finished(&mut self) -> usize {
        let start = self.head;
        while let Some(entry) = self.entries.get_mut(self.head) {
            if !entry.rows.is_finished() {
                break;
            }
            entry.rows.release();
            self.head += 1;
        }
        self.head - start
    }

    /// Rows buffered across all pending entries
    pub fn buffered_rows(&self) -> usize {
        self.pending().iter().map(|t| t.rows.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(name: &str, rows: usize, complete: bool) -> TableExport {
        let mut entry = TableExport {
            table_name: Some(name.to_string()),
            inbound: true,
            rows: RowBuffer::default(),
        };
        for i in 0..rows {
            entry.rows.push(json!({ "id": i }));
        }
        if complete {
            entry.rows.mark_complete();
        }
        entry
    }

    #[test]
    fn test_primary_key_src() {
        assert_eq!(TableSchema::new("t", "++id,name,&email", 0).primary_key_src(), "++id");
        assert_eq!(TableSchema::new("t", "[a+b], c", 0).primary_key_src(), "[a+b]");
        assert_eq!(TableSchema::new("t", "", 0).primary_key_src(), "");
        assert_eq!(TableSchema::new("t", ",name", 0).primary_key_src(), "");
    }

    #[test]
    fn test_table_schema_serde() {
        let schema: TableSchema =
            serde_json::from_value(json!({ "name": "friends", "schema": "++id,name", "rowCount": 3 }))
                .unwrap();
        assert_eq!(schema, TableSchema::new("friends", "++id,name", 3));
    }

    #[test]
    fn test_take_batch_keeps_buffer_usable() {
        let mut entry = table("t", 3, false);
        let batch = entry.rows.take_batch();
        assert_eq!(batch.len(), 3);
        assert!(entry.rows.is_empty());
        assert!(!entry.rows.is_finished());

        entry.rows.push(json!({ "id": 9 }));
        assert_eq!(entry.rows.len(), 1);
    }

    #[test]
    fn test_retire_finished_only_from_front() {
        let mut queue = TableQueue::default();
        queue.push(table("a", 0, true));
        queue.push(table("b", 2, true));
        queue.push(table("c", 0, true));

        assert_eq!(queue.retire_finished(), 1);
        assert_eq!(queue.head(), 1);
        assert_eq!(queue.pending().len(), 2);
        assert_eq!(queue.buffered_rows(), 2);

        queue.get_mut(1).unwrap().rows.take_batch();
        assert_eq!(queue.retire_finished(), 2);
        assert!(queue.is_drained());
        assert_eq!(queue.entry_count(), 3);
    }

    #[test]
    fn test_header_ready() {
        let mut envelope = ExportEnvelope::default();
        assert!(!envelope.header_ready());

        envelope.format_name = Some("dexie".into());
        envelope.format_version = Some(1);
        envelope.data = Some(DatabaseExport {
            database_name: Some("db".into()),
            database_version: Some(1.0),
            tables: None,
            data: None,
        });
        assert!(!envelope.header_ready());

        envelope.data.as_mut().unwrap().tables = Some(vec![]);
        assert!(envelope.header_ready());
        assert!(envelope.queue().is_none());
    }
}
