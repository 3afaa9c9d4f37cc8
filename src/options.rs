//! Import options

use std::fmt;
use std::sync::Arc;
use serde_json::Value;

use crate::codec::{RowCodec, TypesonCodec};
use crate::export::ExportFormat;
use crate::progress::{ImportProgress, ProgressCallback};

/// Default pull size in kilobytes
pub const DEFAULT_KILOBYTES_PER_CHUNK: usize = 512;

/// Row filter: `(table, value, key)`. Returning `false` drops the row.
/// `key` is only present for tables whose keys travel separately.
pub type RowFilter = Box<dyn Fn(&str, &Value, Option<&Value>) -> bool + Send + Sync>;

/// Options controlling an import
pub struct ImportOptions {
    /// Write without a surrounding transaction; earlier writes survive a failure
    pub no_transaction: bool,
    /// Bytes pulled from the source per chunk, in kilobytes
    pub kilobytes_per_chunk: usize,
    pub filter: Option<RowFilter>,
    pub progress_callback: Option<ProgressCallback>,
    /// Skip tables the target does not declare instead of failing
    pub accept_missing_tables: bool,
    pub accept_version_diff: bool,
    pub accept_name_diff: bool,
    pub accept_changed_primary_key: bool,
    /// Replace existing rows instead of failing on duplicate keys
    pub overwrite_values: bool,
    pub clear_tables_before_import: bool,
    /// Tables whose data is discarded
    pub skip_tables: Vec<String>,
    /// Expected format marker and version ceiling
    pub format: ExportFormat,
    pub codec: Arc<dyn RowCodec>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            no_transaction: false,
            kilobytes_per_chunk: DEFAULT_KILOBYTES_PER_CHUNK,
            filter: None,
            progress_callback: None,
            accept_missing_tables: false,
            accept_version_diff: false,
            accept_name_diff: false,
            accept_changed_primary_key: false,
            overwrite_values: false,
            clear_tables_before_import: false,
            skip_tables: Vec::new(),
            format: ExportFormat::DEXIE,
            codec: Arc::new(TypesonCodec),
        }
    }
}

impl ImportOptions {
    /// Pull size in bytes (at least one byte)
    pub fn chunk_bytes(&self) -> usize {
        self.kilobytes_per_chunk.saturating_mul(1024).max(1)
    }

    pub fn is_skipped(&self, table: &str) -> bool {
        self.skip_tables.iter().any(|t| t == table)
    }

    /// Set the row filter (builder pattern)
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str, &Value, Option<&Value>) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Set the progress observer (builder pattern)
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ImportProgress) -> bool + Send + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    pub fn with_codec(mut self, codec: impl RowCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("no_transaction", &self.no_transaction)
            .field("kilobytes_per_chunk", &self.kilobytes_per_chunk)
            .field("filter", &self.filter.is_some())
            .field("progress_callback", &self.progress_callback.is_some())
            .field("accept_missing_tables", &self.accept_missing_tables)
            .field("accept_version_diff", &self.accept_version_diff)
            .field("accept_name_diff", &self.accept_name_diff)
            .field("accept_changed_primary_key", &self.accept_changed_primary_key)
            .field("overwrite_values", &self.overwrite_values)
            .field("clear_tables_before_import", &self.clear_tables_before_import)
            .field("skip_tables", &self.skip_tables)
            .field("format", &self.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ImportOptions::default();
        assert!(!options.no_transaction);
        assert_eq!(options.chunk_bytes(), 512 * 1024);
        assert_eq!(options.format, ExportFormat::DEXIE);
        assert!(options.filter.is_none());
    }

    #[test]
    fn test_builders() {
        let options = ImportOptions {
            kilobytes_per_chunk: 0,
            skip_tables: vec!["logs".to_string()],
            ..Default::default()
        }
        .with_filter(|table, _, _| table != "secret")
        .with_progress(|_| false);

        assert_eq!(options.chunk_bytes(), 1);
        assert!(options.is_skipped("logs"));
        assert!(!options.is_skipped("users"));
        let filter = options.filter.as_ref().unwrap();
        assert!(!filter("secret", &Value::Null, None));
        assert!(format!("{:?}", options).contains("filter: true"));
    }
}
