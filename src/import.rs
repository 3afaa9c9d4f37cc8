//! Import Engine - drain a streamed export into a target database
//!
//! The loop alternates between two phases until the source is exhausted:
//! write every row currently buffered (in table order), then pull one more
//! chunk. Rows are moved out of their buffer as they are written, so memory
//! stays bounded by roughly one chunk of parsed rows regardless of export
//! size.
//!
//! Unless `no_transaction` is set, all writes happen inside a single
//! transaction that is rolled back on any error, including an abort
//! requested by the progress observer.

use std::path::Path;
use serde_json::Value;

use crate::export::{ExportHeader, TableQueue};
use crate::loader::{load_stream, LoadedExport};
use crate::options::ImportOptions;
use crate::progress::ProgressTracker;
use crate::reconcile::{check_database, check_table, TablePlan};
use crate::storage::{SqliteDatabase, TargetDatabase};
use crate::stream::ExportSource;
use crate::{Error, Result};

/// Per-queue-entry bookkeeping, indexed like the table queue
#[derive(Debug, Clone, Copy, Default)]
struct TableState {
    /// Decided on first touch
    plan: Option<TablePlan>,
    /// Already counted in `completed_tables`
    counted: bool,
}

/// Import a streamed export into an existing database
pub async fn import_into<D, S>(db: &mut D, source: S, options: ImportOptions) -> Result<()>
where
    D: TargetDatabase + ?Sized,
    S: ExportSource,
{
    let loaded = load_stream(source, options.chunk_bytes(), options.format).await?;
    import_loaded(db, loaded, options).await
}

/// Create a new SQLite database from an export's header and import its rows.
/// `path` of `None` keeps the database in memory.
pub async fn import_database<S: ExportSource>(
    path: Option<&Path>,
    source: S,
    options: ImportOptions,
) -> Result<SqliteDatabase> {
    let loaded = load_stream(source, options.chunk_bytes(), options.format).await?;
    let header = &loaded.header;
    let mut db = SqliteDatabase::create(path, &header.database_name, header.database_version, &header.tables)?;
    import_loaded(&mut db, loaded, options).await?;
    Ok(db)
}

/// Import an export whose header has already been loaded and validated
pub async fn import_loaded<D, S>(db: &mut D, loaded: LoadedExport<S>, mut options: ImportOptions) -> Result<()>
where
    D: TargetDatabase + ?Sized,
    S: ExportSource,
{
    let LoadedExport { header, mut stream } = loaded;
    check_database(&header, &*db, &options)?;

    let mut tracker = ProgressTracker::new(
        header.tables.len(),
        header.total_rows(),
        options.progress_callback.take(),
    );
    tracker.notify()?;

    if options.no_transaction {
        drain(db, &header, &options, &mut stream, &mut tracker).await?;
        return tracker.finish();
    }

    let tables: Vec<String> = header
        .tables
        .iter()
        .filter(|t| db.table(&t.name).is_some() && !options.is_skipped(&t.name))
        .map(|t| t.name.clone())
        .collect();
    db.begin_transaction(&tables).await?;

    let outcome = match drain(db, &header, &options, &mut stream, &mut tracker).await {
        Ok(()) => tracker.finish(),
        Err(e) => Err(e),
    };
    match outcome {
        Ok(()) => {
            db.commit().await?;
            let progress = tracker.progress();
            tracing::info!(
                "Imported {} rows into {} tables of {}",
                progress.completed_rows,
                progress.completed_tables,
                db.name()
            );
            Ok(())
        }
        Err(e) => {
            if let Err(rollback_err) = db.rollback().await {
                tracing::error!("Rollback failed after import error: {}", rollback_err);
            }
            Err(e)
        }
    }
}

/// Alternate write passes and pulls until the source is exhausted
async fn drain<D, S>(
    db: &mut D,
    header: &ExportHeader,
    options: &ImportOptions,
    stream: &mut S,
    tracker: &mut ProgressTracker,
) -> Result<()>
where
    D: TargetDatabase + ?Sized,
    S: ExportSource,
{
    let chunk_bytes = options.chunk_bytes();
    let mut states: Vec<TableState> = Vec::new();

    loop {
        write_pass(db, header, options, stream, tracker, &mut states).await?;

        if let Some(queue) = stream.result_mut().queue_mut() {
            let retired = queue.retire_finished();
            if retired > 0 {
                tracing::debug!("Retired {} finished tables ({} pending)", retired, queue.pending().len());
            }
        }

        if stream.done() || stream.eof() {
            break;
        }
        stream.pull(chunk_bytes).await?;
    }

    if !stream.done() {
        return Err(Error::TruncatedInput {
            table: undelivered_table(header, stream.result().queue()),
        });
    }
    Ok(())
}

/// First manifest table whose rows did not all arrive. An export whose
/// tables all arrived but whose document never closed names its last table.
fn undelivered_table(header: &ExportHeader, queue: Option<&TableQueue>) -> String {
    let delivered: Vec<&str> = queue
        .map(|q| {
            (0..q.entry_count())
                .filter_map(|i| q.get(i))
                .filter(|t| t.rows.is_complete())
                .filter_map(|t| t.table_name.as_deref())
                .collect()
        })
        .unwrap_or_default();

    header
        .tables
        .iter()
        .map(|t| t.name.as_str())
        .find(|name| !delivered.contains(name))
        .or_else(|| delivered.last().copied())
        .unwrap_or("<unnamed>")
        .to_string()
}

/// Write every row buffered right now, stopping at the first table that
/// still waits for rows
async fn write_pass<D, S>(
    db: &mut D,
    header: &ExportHeader,
    options: &ImportOptions,
    stream: &mut S,
    tracker: &mut ProgressTracker,
    states: &mut Vec<TableState>,
) -> Result<()>
where
    D: TargetDatabase + ?Sized,
    S: ExportSource,
{
    let Some(queue) = stream.result_mut().queue_mut() else {
        return Ok(());
    };
    if states.len() < queue.entry_count() {
        states.resize(queue.entry_count(), TableState::default());
    }

    for index in queue.head()..queue.entry_count() {
        let Some(entry) = queue.get_mut(index) else {
            break;
        };
        let Some(table_name) = entry.table_name.clone() else {
            break;
        };
        let state = &mut states[index];

        if entry.rows.is_empty() {
            if !entry.rows.is_complete() {
                break;
            }
            if !state.counted {
                state.counted = true;
                tracker.complete_table();
            }
            continue;
        }

        tracker.notify()?;

        let plan = match state.plan {
            Some(plan) => plan,
            None => {
                let plan = check_table(header, &table_name, &*db, options)?;
                if plan == TablePlan::Import && options.clear_tables_before_import {
                    tracing::debug!("Clearing table {} before import", table_name);
                    db.clear(&table_name).await?;
                }
                state.plan = Some(plan);
                plan
            }
        };

        let batch = entry.rows.take_batch();
        let complete = entry.rows.is_complete();
        match plan {
            TablePlan::Import => {
                let rows = batch.len();
                write_batch(db, &table_name, entry.inbound, batch, options).await?;
                tracker.add_rows(rows);
            }
            TablePlan::Skip => {
                tracing::debug!("Discarded {} rows of skipped table {}", batch.len(), table_name);
            }
        }

        if complete && !state.counted {
            state.counted = true;
            tracker.complete_table();
        }
    }
    Ok(())
}

/// Revive, filter and store one batch. A filtered-out row drops its key and
/// value together.
async fn write_batch<D>(
    db: &mut D,
    table: &str,
    inbound: bool,
    batch: Vec<Value>,
    options: &ImportOptions,
) -> Result<()>
where
    D: TargetDatabase + ?Sized,
{
    let keep = |value: &Value, key: Option<&Value>| options.filter.as_ref().is_none_or(|f| f(table, value, key));

    let mut values = Vec::with_capacity(batch.len());
    let mut keys = if inbound { None } else { Some(Vec::with_capacity(batch.len())) };

    for row in batch {
        let row = options.codec.revive(row)?;
        match keys.as_mut() {
            None => {
                if keep(&row, None) {
                    values.push(row);
                }
            }
            Some(keys) => {
                let (key, value) = split_pair(row, table)?;
                if keep(&value, Some(&key)) {
                    keys.push(key);
                    values.push(value);
                }
            }
        }
    }

    if values.is_empty() {
        return Ok(());
    }
    if options.overwrite_values {
        db.bulk_put(table, values, keys).await
    } else {
        db.bulk_add(table, values, keys).await
    }
}

/// Split an outbound row `[key, value]`
fn split_pair(row: Value, table: &str) -> Result<(Value, Value)> {
    let malformed = || Error::MalformedExport(format!("row of {} (expected [key, value])", table));
    let Value::Array(pair) = row else {
        return Err(malformed());
    };
    let Ok([key, value]) = <[Value; 2]>::try_from(pair) else {
        return Err(malformed());
    };
    Ok((key, value))
}
