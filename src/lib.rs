//! # Snapimport - Chunked Snapshot Import
//!
//! Restores a serialized database export into a live database without
//! holding the whole export in memory.
//!
//! Snapimport provides:
//! - An incremental JSON export parser fed from any async byte source
//! - Header validation and schema reconciliation against the target
//! - A chunked import loop with filtering, progress and cooperative abort
//! - Transactional (all-or-nothing) and non-transactional import modes
//! - SQLite-backed target storage

pub mod export;
pub mod stream;
pub mod loader;
pub mod reconcile;
pub mod progress;
pub mod codec;
pub mod options;
pub mod storage;
pub mod import;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use export::{ExportFormat, ExportHeader, TableSchema};
pub use stream::{ExportSource, JsonExportStream};
pub use loader::{load_stream, peek, LoadedExport};
pub use progress::ImportProgress;
pub use codec::{PassthroughCodec, RowCodec, TypesonCodec};
pub use options::ImportOptions;
pub use storage::{SqliteDatabase, TableDef, TargetDatabase};
pub use import::{import_database, import_into};

/// Result type alias for Snapimport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Snapimport operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not a {expected} export (format marker: {found:?})")]
    Format {
        expected: &'static str,
        found: Option<String>,
    },

    #[error("Export format version {version} is not supported (max {max})")]
    UnsupportedVersion { version: u32, max: u32 },

    #[error("Malformed export: missing or invalid {0}")]
    MalformedExport(String),

    #[error("Database name differs: export has {export:?}, target is {target:?}")]
    NameMismatch { export: String, target: String },

    #[error("Database version differs: export has {export}, target is {target}")]
    VersionMismatch { export: f64, target: f64 },

    #[error("Table {0} does not exist in the target database")]
    MissingTable(String),

    #[error("Primary key of table {table} changed: export has {export:?}, target is {target:?}")]
    PrimaryKeyMismatch {
        table: String,
        export: String,
        target: String,
    },

    #[error("Operation aborted")]
    Aborted,

    #[error("Export ended before all rows of table {table} were delivered")]
    TruncatedInput { table: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Duplicate key {key} in table {table}")]
    DuplicateKey { table: String, key: String },

    #[error("Key error: {0}")]
    Key(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
