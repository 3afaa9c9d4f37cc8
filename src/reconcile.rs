//! Schema Reconciler - compare export metadata against the target
//!
//! Global checks run once before any row is processed; table checks run
//! lazily the first time the importer touches a table.

use crate::export::{ExportHeader, TableSchema};
use crate::options::ImportOptions;
use crate::storage::TargetDatabase;
use crate::{Error, Result};

/// What to do with a table's rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePlan {
    /// Write rows into the target table
    Import,
    /// Discard rows as they arrive
    Skip,
}

/// Database name and version checks
pub fn check_database<D: TargetDatabase + ?Sized>(
    header: &ExportHeader,
    db: &D,
    options: &ImportOptions,
) -> Result<()> {
    if !options.accept_name_diff && header.database_name != db.name() {
        return Err(Error::NameMismatch {
            export: header.database_name.clone(),
            target: db.name().to_string(),
        });
    }
    if !options.accept_version_diff && header.database_version != db.version() {
        return Err(Error::VersionMismatch {
            export: header.database_version,
            target: db.version(),
        });
    }
    Ok(())
}

/// Existence and primary-key checks for one table
pub fn check_table<D: TargetDatabase + ?Sized>(
    header: &ExportHeader,
    table_name: &str,
    db: &D,
    options: &ImportOptions,
) -> Result<TablePlan> {
    if options.is_skipped(table_name) {
        tracing::info!("Skipping table {} (excluded by options)", table_name);
        return Ok(TablePlan::Skip);
    }

    let schema: &TableSchema = header
        .table(table_name)
        .ok_or_else(|| Error::MalformedExport(format!("tables entry for {}", table_name)))?;

    let Some(target) = db.table(table_name) else {
        if options.accept_missing_tables {
            tracing::warn!("Table {} does not exist in target, skipping its rows", table_name);
            return Ok(TablePlan::Skip);
        }
        return Err(Error::MissingTable(table_name.to_string()));
    };

    if !options.accept_changed_primary_key && schema.primary_key_src() != target.primary_key.src {
        return Err(Error::PrimaryKeyMismatch {
            table: table_name.to_string(),
            export: schema.primary_key_src().to_string(),
            target: target.primary_key.src.clone(),
        });
    }
    Ok(TablePlan::Import)
}
