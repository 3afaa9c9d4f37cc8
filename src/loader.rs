//! Stream Loader - bootstrap an export stream up to its header
//!
//! Pulls chunks until the format identity, database identity and table
//! manifest are known, validates them, and hands back the live stream so the
//! importer can keep draining it. Row data need not be available yet.

use crate::export::{ExportFormat, ExportHeader};
use crate::stream::ExportSource;
use crate::{Error, Result};

/// A validated export whose rows are still being streamed
pub struct LoadedExport<S> {
    pub header: ExportHeader,
    pub stream: S,
}

/// Pull until the header is parsed, then validate it against `format`
pub async fn load_stream<S: ExportSource>(
    mut stream: S,
    chunk_bytes: usize,
    format: ExportFormat,
) -> Result<LoadedExport<S>> {
    while !stream.result().header_ready() && !stream.done() && !stream.eof() {
        stream.pull(chunk_bytes).await?;
    }

    let header = validate(&stream, format)?;
    tracing::info!(
        "Loaded export of {} v{} ({} tables, {} rows declared)",
        header.database_name,
        header.database_version,
        header.tables.len(),
        header.total_rows()
    );
    Ok(LoadedExport { header, stream })
}

/// Read only the header of an export
pub async fn peek<S: ExportSource>(stream: S, chunk_bytes: usize, format: ExportFormat) -> Result<ExportHeader> {
    load_stream(stream, chunk_bytes, format).await.map(|loaded| loaded.header)
}

fn validate<S: ExportSource>(stream: &S, format: ExportFormat) -> Result<ExportHeader> {
    let envelope = stream.result();

    if envelope.format_name.as_deref() != Some(format.name) {
        return Err(Error::Format {
            expected: format.name,
            found: envelope.format_name.clone(),
        });
    }

    let format_version = envelope
        .format_version
        .ok_or_else(|| Error::MalformedExport("formatVersion".to_string()))?;
    if format_version > format.max_version {
        return Err(Error::UnsupportedVersion {
            version: format_version,
            max: format.max_version,
        });
    }

    let missing = |field: &str| Error::MalformedExport(field.to_string());
    let data = envelope.data.as_ref().ok_or_else(|| missing("data"))?;
    let database_name = data.database_name.clone().ok_or_else(|| missing("databaseName"))?;
    let database_version = data.database_version.ok_or_else(|| missing("databaseVersion"))?;
    let tables = data.tables.clone().ok_or_else(|| missing("tables"))?;

    Ok(ExportHeader {
        format_name: format.name.to_string(),
        format_version,
        database_name,
        database_version,
        tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::JsonExportStream;

    const FORMAT: ExportFormat = ExportFormat::DEXIE;

    async fn load(doc: &str) -> Result<ExportHeader> {
        peek(JsonExportStream::from_bytes(doc.to_string()), 16, FORMAT).await
    }

    #[tokio::test]
    async fn test_loads_header_without_reading_rows() {
        let doc = r#"{"formatName":"dexie","formatVersion":1,"data":{"databaseName":"db","databaseVersion":3,
            "tables":[{"name":"t","schema":"id","rowCount":2}],
            "data":[{"tableName":"t","inbound":true,"rows":[{"id":1},{"id":2}]}]}}"#;
        let loaded = load_stream(JsonExportStream::from_bytes(doc), 16, FORMAT).await.unwrap();

        assert_eq!(loaded.header.database_name, "db");
        assert_eq!(loaded.header.database_version, 3.0);
        assert_eq!(loaded.header.tables.len(), 1);
        assert_eq!(loaded.header.total_rows(), 2);
        assert!(!loaded.stream.done());
        assert!(loaded.stream.bytes_read() < doc.len() as u64);
    }

    #[tokio::test]
    async fn test_wrong_format_marker() {
        let err = load(r#"{"formatName":"other","formatVersion":1,"data":{}}"#).await.unwrap_err();
        assert!(matches!(err, Error::Format { found: Some(ref f), .. } if f == "other"));

        let err = load(r#"{"formatVersion":1}"#).await.unwrap_err();
        assert!(matches!(err, Error::Format { found: None, .. }));
    }

    #[tokio::test]
    async fn test_format_checked_before_version() {
        let err = load(r#"{"formatName":"other","formatVersion":99}"#).await.unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let err = load(r#"{"formatName":"dexie","formatVersion":2,"data":{}}"#).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { version: 2, max: 1 }));
    }

    #[tokio::test]
    async fn test_missing_fields_named_in_order() {
        let cases = [
            (r#"{"formatName":"dexie","formatVersion":1}"#, "data"),
            (r#"{"formatName":"dexie","formatVersion":1,"data":{"tables":[]}}"#, "databaseName"),
            (
                r#"{"formatName":"dexie","formatVersion":1,"data":{"databaseName":"x","tables":[]}}"#,
                "databaseVersion",
            ),
            (
                r#"{"formatName":"dexie","formatVersion":1,"data":{"databaseName":"x","databaseVersion":1}}"#,
                "tables",
            ),
        ];
        for (doc, field) in cases {
            match load(doc).await {
                Err(Error::MalformedExport(missing)) => assert_eq!(missing, field, "{}", doc),
                other => panic!("expected missing {}, got {:?}", field, other),
            }
        }
    }
}
