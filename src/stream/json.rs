//! Incremental JSON export parser
//!
//! Walks the fixed spine of an export document
//! (`envelope -> data -> data[] -> table -> rows[]`) with an explicit frame
//! stack, so parsing can stop at any byte and resume on the next pull. Every
//! value off the spine (header fields, the table manifest, each row) is
//! located with the boundary scanner and decoded whole by serde_json. Bytes
//! are dropped from the internal buffer as soon as they are consumed.

use async_trait::async_trait;
use serde_json::Value;
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::scanner::{is_whitespace, scan_value, Scan};
use super::ExportSource;
use crate::export::{DatabaseExport, ExportEnvelope, TableExport, TableQueue, TableSchema};
use crate::{Error, Result};

/// Largest single read issued against the byte source
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Structural level of the export document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spine {
    Envelope,
    Database,
    Tables,
    Table,
    Rows,
}

impl Spine {
    fn is_object(self) -> bool {
        matches!(self, Spine::Envelope | Spine::Database | Spine::Table)
    }

    fn closer(self) -> u8 {
        if self.is_object() { b'}' } else { b']' }
    }
}

/// Position inside an object or array
#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    /// Just after the opening bracket
    Start,
    /// Just after a comma
    AfterComma,
    /// Object key read, colon expected
    Key(String),
    /// Value expected (key is `None` inside arrays)
    Value(Option<String>),
    /// Value consumed, comma or closing bracket expected
    Next,
}

#[derive(Debug)]
struct Frame {
    spine: Spine,
    position: Position,
}

/// Export parser over any async byte source
pub struct JsonExportStream<R> {
    reader: R,
    buf: Vec<u8>,
    pos: usize,
    scratch: Vec<u8>,
    stack: Vec<Frame>,
    finished: bool,
    eof: bool,
    bytes_read: u64,
    result: ExportEnvelope,
}

impl JsonExportStream<Cursor<Vec<u8>>> {
    /// Parser over an export that is already fully in memory
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Cursor::new(bytes.into()))
    }
}

impl<R: AsyncRead + Unpin + Send> JsonExportStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            pos: 0,
            scratch: Vec::new(),
            stack: Vec::new(),
            finished: false,
            eof: false,
            bytes_read: 0,
            result: ExportEnvelope::default(),
        }
    }

    /// Total bytes pulled from the source so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Bytes read but not yet consumed by the parser
    pub fn buffered_bytes(&self) -> usize {
        self.buf.len() - self.pos
    }

    async fn fill(&mut self, byte_budget: usize) -> Result<()> {
        let budget = byte_budget.max(1);
        let size = budget.min(READ_BUFFER_SIZE);
        if self.scratch.len() < size {
            self.scratch.resize(size, 0);
        }

        let mut read = 0;
        while read < budget {
            let want = (budget - read).min(self.scratch.len());
            let n = self.reader.read(&mut self.scratch[..want]).await?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.buf.extend_from_slice(&self.scratch[..n]);
            read += n;
        }
        self.bytes_read += read as u64;
        tracing::debug!("Pulled {} bytes ({} total, eof: {})", read, self.bytes_read, self.eof);
        Ok(())
    }

    /// Parse as far as the buffered bytes allow
    fn advance(&mut self) -> Result<()> {
        loop {
            while self.pos < self.buf.len() && is_whitespace(self.buf[self.pos]) {
                self.pos += 1;
            }
            if self.pos >= self.buf.len() {
                break;
            }
            if self.finished {
                // Trailing bytes after the document are ignored
                self.pos = self.buf.len();
                break;
            }
            if !self.step()? {
                break;
            }
        }

        self.buf.drain(..self.pos);
        self.pos = 0;
        Ok(())
    }

    /// Consume one token or value. Returns false when more bytes are needed.
    fn step(&mut self) -> Result<bool> {
        let byte = self.buf[self.pos];

        let Some(frame) = self.stack.last() else {
            if byte != b'{' {
                return Err(Error::Parse(format!(
                    "export must start with an object, found {:?}",
                    byte as char
                )));
            }
            self.pos += 1;
            self.push_frame(Spine::Envelope);
            return Ok(true);
        };
        let spine = frame.spine;
        let position = frame.position.clone();

        match position {
            Position::Start | Position::Next if byte == spine.closer() => {
                self.pos += 1;
                self.close_frame()?;
                Ok(true)
            }
            Position::Next => {
                if byte != b',' {
                    return Err(Error::Parse(format!(
                        "expected ',' or {:?}, found {:?}",
                        spine.closer() as char,
                        byte as char
                    )));
                }
                self.pos += 1;
                self.set_position(Position::AfterComma);
                Ok(true)
            }
            Position::Start | Position::AfterComma if spine.is_object() => {
                if byte != b'"' {
                    return Err(Error::Parse(format!("expected object key, found {:?}", byte as char)));
                }
                let Some(key) = self.read_leaf()? else {
                    return Ok(false);
                };
                let key = match key {
                    Value::String(key) => key,
                    _ => return Err(Error::Parse("object key is not a string".to_string())),
                };
                self.set_position(Position::Key(key));
                Ok(true)
            }
            Position::Key(key) => {
                if byte != b':' {
                    return Err(Error::Parse(format!("expected ':' after key {:?}", key)));
                }
                self.pos += 1;
                self.set_position(Position::Value(Some(key)));
                Ok(true)
            }
            Position::Start | Position::AfterComma => self.value(spine, None),
            Position::Value(key) => self.value(spine, key.as_deref()),
        }
    }

    /// Handle the value for `key` in a frame of kind `spine`
    fn value(&mut self, spine: Spine, key: Option<&str>) -> Result<bool> {
        match (spine, key) {
            (Spine::Envelope, Some("data")) => {
                self.open(b'{', Spine::Database, "data")?;
                self.result.data.get_or_insert_with(DatabaseExport::default);
                Ok(true)
            }
            (Spine::Database, Some("data")) => {
                self.open(b'[', Spine::Tables, "data.data")?;
                if let Some(db) = self.result.data.as_mut() {
                    db.data.get_or_insert_with(TableQueue::default);
                }
                Ok(true)
            }
            (Spine::Tables, None) => {
                self.open(b'{', Spine::Table, "data.data")?;
                if let Some(queue) = self.result.queue_mut() {
                    queue.push(TableExport::default());
                }
                Ok(true)
            }
            (Spine::Table, Some("rows")) => {
                self.open(b'[', Spine::Rows, "rows")?;
                Ok(true)
            }
            _ => {
                let Some(value) = self.read_leaf()? else {
                    return Ok(false);
                };
                self.assign(spine, key, value)?;
                Ok(true)
            }
        }
    }

    /// Enter a spine container. The parent position moves to `Next` first so
    /// it resumes correctly once the child closes.
    fn open(&mut self, opener: u8, spine: Spine, field: &str) -> Result<()> {
        if self.buf[self.pos] != opener {
            return Err(Error::MalformedExport(field.to_string()));
        }
        self.pos += 1;
        self.set_position(Position::Next);
        self.push_frame(spine);
        Ok(())
    }

    /// Read one complete value off the spine, or `None` if it is still partial
    fn read_leaf(&mut self) -> Result<Option<Value>> {
        match scan_value(&self.buf, self.pos, self.eof)? {
            Scan::Incomplete => Ok(None),
            Scan::Complete(end) => {
                let value = serde_json::from_slice(&self.buf[self.pos..end])
                    .map_err(|e| Error::Parse(e.to_string()))?;
                self.pos = end;
                Ok(Some(value))
            }
        }
    }

    fn assign(&mut self, spine: Spine, key: Option<&str>, value: Value) -> Result<()> {
        if spine != Spine::Rows {
            self.set_position(Position::Next);
        }

        match (spine, key) {
            (Spine::Envelope, Some("formatName")) => {
                self.result.format_name = Some(as_string(value, "formatName")?);
            }
            (Spine::Envelope, Some("formatVersion")) => {
                let version = value
                    .as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| Error::MalformedExport("formatVersion".to_string()))?;
                self.result.format_version = Some(version);
            }
            (Spine::Database, Some(field)) => {
                let Some(db) = self.result.data.as_mut() else {
                    return Ok(());
                };
                match field {
                    "databaseName" => db.database_name = Some(as_string(value, field)?),
                    "databaseVersion" => {
                        let version = value
                            .as_f64()
                            .ok_or_else(|| Error::MalformedExport(field.to_string()))?;
                        db.database_version = Some(version);
                    }
                    "tables" => {
                        let tables: Vec<TableSchema> = serde_json::from_value(value)
                            .map_err(|_| Error::MalformedExport(field.to_string()))?;
                        db.tables = Some(tables);
                    }
                    _ => {}
                }
            }
            (Spine::Table, Some(field)) => {
                let Some(table) = self.current_table() else {
                    return Ok(());
                };
                match field {
                    "tableName" => table.table_name = Some(as_string(value, field)?),
                    "inbound" => {
                        table.inbound = value
                            .as_bool()
                            .ok_or_else(|| Error::MalformedExport(field.to_string()))?;
                    }
                    _ => {}
                }
            }
            (Spine::Rows, _) => {
                self.set_position(Position::Next);
                if let Some(table) = self.current_table() {
                    table.rows.push(value);
                }
            }
            // Unknown members are skipped
            _ => {}
        }
        Ok(())
    }

    fn close_frame(&mut self) -> Result<()> {
        let Some(frame) = self.stack.pop() else {
            return Err(Error::Parse("unbalanced closing bracket".to_string()));
        };
        match frame.spine {
            Spine::Rows | Spine::Table => {
                if let Some(table) = self.current_table() {
                    table.rows.mark_complete();
                }
            }
            Spine::Envelope => {
                self.finished = true;
                tracing::debug!("Export document fully parsed");
            }
            Spine::Database | Spine::Tables => {}
        }
        Ok(())
    }

    fn current_table(&mut self) -> Option<&mut TableExport> {
        self.result.queue_mut().and_then(TableQueue::last_mut)
    }

    fn push_frame(&mut self, spine: Spine) {
        self.stack.push(Frame {
            spine,
            position: Position::Start,
        });
    }

    fn set_position(&mut self, position: Position) {
        if let Some(frame) = self.stack.last_mut() {
            frame.position = position;
        }
    }
}

fn as_string(value: Value, field: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(Error::MalformedExport(field.to_string())),
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ExportSource for JsonExportStream<R> {
    async fn pull(&mut self, byte_budget: usize) -> Result<()> {
        if !self.eof {
            self.fill(byte_budget).await?;
        }
        self.advance()
    }

    fn done(&self) -> bool {
        self.finished
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn result(&self) -> &ExportEnvelope {
        &self.result
    }

    fn result_mut(&mut self) -> &mut ExportEnvelope {
        &mut self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_export() -> String {
        r#"{
            "formatName": "dexie",
            "formatVersion": 1,
            "data": {
                "databaseName": "library",
                "databaseVersion": 2,
                "tables": [
                    { "name": "books", "schema": "++id,title", "rowCount": 3 },
                    { "name": "notes", "schema": "", "rowCount": 2 }
                ],
                "data": [
                    {
                        "tableName": "books",
                        "inbound": true,
                        "rows": [
                            { "id": 1, "title": "Dune, \"the\" novel" },
                            { "id": 2, "title": "Emma ]}" },
                            { "id": 3, "title": "Ulysses" }
                        ]
                    },
                    {
                        "tableName": "notes",
                        "inbound": false,
                        "rows": [[10, "first"], [11, { "text": "second" }]]
                    }
                ]
            }
        }"#
        .to_string()
    }

    async fn drain_rows(stream: &mut JsonExportStream<Cursor<Vec<u8>>>, budget: usize) -> Vec<(String, Value)> {
        let mut seen = Vec::new();
        loop {
            stream.pull(budget).await.unwrap();
            if let Some(queue) = stream.result_mut().queue_mut() {
                for index in queue.head()..queue.entry_count() {
                    let table = queue.get_mut(index).unwrap();
                    let name = table.table_name.clone().unwrap_or_default();
                    for row in table.rows.take_batch() {
                        seen.push((name.clone(), row));
                    }
                }
                queue.retire_finished();
            }
            if stream.done() || stream.eof() {
                break;
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_parse_whole_block() {
        let mut stream = JsonExportStream::from_bytes(sample_export());
        stream.pull(usize::MAX / 2).await.unwrap();

        assert!(stream.done());
        let result = stream.result();
        assert_eq!(result.format_name.as_deref(), Some("dexie"));
        assert_eq!(result.format_version, Some(1));
        assert!(result.header_ready());

        let db = result.data.as_ref().unwrap();
        assert_eq!(db.database_name.as_deref(), Some("library"));
        assert_eq!(db.database_version, Some(2.0));
        assert_eq!(db.tables.as_ref().unwrap().len(), 2);

        let queue = result.queue().unwrap();
        assert_eq!(queue.entry_count(), 2);
        let books = queue.get(0).unwrap();
        assert_eq!(books.table_name.as_deref(), Some("books"));
        assert!(books.inbound);
        assert!(books.rows.is_complete());
        assert_eq!(books.rows.len(), 3);

        let notes = queue.get(1).unwrap();
        assert!(!notes.inbound);
        assert_eq!(notes.rows.len(), 2);
        assert_eq!(stream.buffered_bytes(), 0);
    }

    #[tokio::test]
    async fn test_every_chunk_size_yields_same_rows() {
        let expected = {
            let mut stream = JsonExportStream::from_bytes(sample_export());
            drain_rows(&mut stream, 1 << 20).await
        };
        assert_eq!(expected.len(), 5);
        assert_eq!(expected[1].1, json!({ "id": 2, "title": "Emma ]}" }));
        assert_eq!(expected[3], ("notes".to_string(), json!([10, "first"])));

        for budget in 1..40 {
            let mut stream = JsonExportStream::from_bytes(sample_export());
            let rows = drain_rows(&mut stream, budget).await;
            assert_eq!(rows, expected, "chunk size {}", budget);
            assert!(stream.done(), "chunk size {}", budget);
        }
    }

    #[tokio::test]
    async fn test_header_available_before_rows() {
        let doc = sample_export();
        let cut = doc.find("Ulysses").unwrap();
        let mut stream = JsonExportStream::from_bytes(doc[..cut].to_string());
        stream.pull(1 << 20).await.unwrap();

        assert!(stream.eof());
        assert!(!stream.done());
        assert!(stream.result().header_ready());
        let books = stream.result().queue().unwrap().get(0).unwrap();
        assert_eq!(books.rows.len(), 2);
        assert!(!books.rows.is_complete());
    }

    #[tokio::test]
    async fn test_whitespace_and_unknown_members() {
        let doc = r#"
        {
            "formatName" : "dexie",
            "extra" : { "nested" : [1, 2, {"x": "}"}] },
            "formatVersion" : 1,
            "data" : {
                "databaseName" : "db",
                "databaseVersion" : 1.5,
                "tables" : [ ],
                "data" : [ { "tableName" : "t", "extra": null, "inbound" : true, "rows" : [ ] } ]
            }
        }
        "#;
        let mut stream = JsonExportStream::from_bytes(doc);
        stream.pull(7).await.unwrap();
        while !stream.done() && !stream.eof() {
            stream.pull(7).await.unwrap();
        }
        assert!(stream.done());
        let table = stream.result().queue().unwrap().get(0).unwrap();
        assert!(table.rows.is_finished());
        assert_eq!(stream.result().data.as_ref().unwrap().database_version, Some(1.5));
    }

    #[tokio::test]
    async fn test_rows_must_be_an_array() {
        let doc = r#"{"formatName":"dexie","formatVersion":1,"data":{"data":[{"tableName":"t","rows":5}]}}"#;
        let mut stream = JsonExportStream::from_bytes(doc);
        let err = stream.pull(1024).await.unwrap_err();
        assert!(matches!(err, Error::MalformedExport(field) if field == "rows"));
    }

    #[tokio::test]
    async fn test_syntax_error() {
        let mut stream = JsonExportStream::from_bytes(r#"{"formatName" "dexie"}"#);
        assert!(matches!(stream.pull(1024).await, Err(Error::Parse(_))));

        let mut stream = JsonExportStream::from_bytes("[1, 2]");
        assert!(matches!(stream.pull(1024).await, Err(Error::Parse(_))));
    }
}
