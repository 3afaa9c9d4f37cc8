//! Snapimport CLI - restore database exports in bounded memory

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use snapimport::config::{self, SnapimportConfig};
use snapimport::ui::{self, ImportProgressBar, ProgressMessage};
use snapimport::{import_database, import_into, peek, Error, ImportOptions, ImportProgress, JsonExportStream, SqliteDatabase};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "snapimport")]
#[command(version)]
#[command(about = "Chunked import of database exports into SQLite")]
#[command(long_about = r#"
Snapimport streams a database export into a SQLite database without
loading the export into memory.

Example usage:
  snapimport init
  snapimport inspect backup.json
  snapimport restore backup.json --database app.db
  snapimport import backup.json --overwrite
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an export into an existing database
    Import {
        /// Export file
        file: PathBuf,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        #[command(flatten)]
        flags: ImportFlags,
    },

    /// Create a new database from an export
    Restore {
        /// Export file
        file: PathBuf,

        /// Path to the database file to create
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Replace the database file if it exists
        #[arg(short, long)]
        force: bool,

        #[command(flatten)]
        flags: ImportFlags,
    },

    /// Show the header of an export without importing it
    Inspect {
        /// Export file
        file: PathBuf,

        /// Print the header as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show statistics about a database
    Stats {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default config file
    Init {
        /// Database path to record in the config
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },
}

/// Flags shared by `import` and `restore`. Each one only turns a setting on;
/// the config file supplies the defaults.
#[derive(Args, Debug, Default)]
struct ImportFlags {
    /// Kilobytes pulled from the export per chunk
    #[arg(long)]
    chunk_kb: Option<usize>,

    /// Write without a transaction (earlier writes survive a failure)
    #[arg(long)]
    no_transaction: bool,

    /// Skip tables the database does not declare
    #[arg(long)]
    accept_missing_tables: bool,

    /// Allow a different database version
    #[arg(long)]
    accept_version_diff: bool,

    /// Allow a different database name
    #[arg(long)]
    accept_name_diff: bool,

    /// Allow a changed primary key
    #[arg(long)]
    accept_changed_primary_key: bool,

    /// Replace rows with existing keys
    #[arg(long)]
    overwrite: bool,

    /// Clear each table before its first row is imported
    #[arg(long)]
    clear: bool,

    /// Discard the rows of a table (repeatable)
    #[arg(long = "skip-table", value_name = "TABLE")]
    skip_tables: Vec<String>,
}

impl ImportFlags {
    fn apply(self, config: &SnapimportConfig) -> ImportOptions {
        let mut options = config.import_options();
        if let Some(kb) = self.chunk_kb {
            options.kilobytes_per_chunk = kb;
        }
        options.no_transaction |= self.no_transaction;
        options.accept_missing_tables |= self.accept_missing_tables;
        options.accept_version_diff |= self.accept_version_diff;
        options.accept_name_diff |= self.accept_name_diff;
        options.accept_changed_primary_key |= self.accept_changed_primary_key;
        options.overwrite_values |= self.overwrite;
        options.clear_tables_before_import |= self.clear;
        options.skip_tables.extend(self.skip_tables);
        options
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();

    match cli.command {
        Commands::Import { file, database, flags } => {
            let database = resolve_database(database, &config)?;
            if !database.exists() {
                anyhow::bail!(
                    "database {} does not exist (use `snapimport restore` to create it)",
                    database.display()
                );
            }
            let options = flags.apply(&config);
            run_import(&file, &database, options, Mode::Existing).await?;
        }

        Commands::Restore { file, database, force, flags } => {
            let database = resolve_database(database, &config)?;
            if database.exists() {
                if !force {
                    anyhow::bail!("database {} already exists (use --force to replace it)", database.display());
                }
                std::fs::remove_file(&database)
                    .with_context(|| format!("removing {}", database.display()))?;
            }
            let options = flags.apply(&config);
            run_import(&file, &database, options, Mode::Create).await?;
        }

        Commands::Inspect { file, json } => {
            let reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let options = config.import_options();
            let spinner = ui::Spinner::new("Reading export header");
            let header = peek(JsonExportStream::new(reader), options.chunk_bytes(), options.format).await;
            spinner.finish_and_clear();
            let header = header?;

            if json {
                println!("{}", serde_json::to_string_pretty(&header)?);
            } else {
                ui::header(&format!("Export of {} (version {})", header.database_name, header.database_version));
                ui::info("Format", &format!("{} v{}", header.format_name, header.format_version));
                ui::info("Declared rows", &header.total_rows().to_string());
                println!("{}", ui::header_table(&header));
            }
        }

        Commands::Stats { database, json } => {
            let database = resolve_database(database, &config)?;
            if !database.exists() {
                anyhow::bail!("database {} does not exist", database.display());
            }
            let db = SqliteDatabase::open(&database)?;
            let stats = db.stats()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                ui::section(&format!("{}Statistics ({})", ui::theme().glyph(ui::Icons::STATS), database.display()));
                ui::summary_row("Name:", &format!("{} (version {})", stats.name, stats.version));
                ui::summary_row("Rows:", &stats.total_rows().to_string());
                println!("{}", ui::stats_table(&stats));
            }
        }

        Commands::Init { database, force } => {
            let path = cli.config.clone().unwrap_or_else(config::default_config_path);
            let cwd = std::env::current_dir()?;
            let database = database.unwrap_or_else(|| config::default_database_path_in(&cwd));
            config::ensure_db_dir(&database)?;

            let written = SnapimportConfig {
                database: Some(database.display().to_string()),
                chunk_kb: Some(snapimport::options::DEFAULT_KILOBYTES_PER_CHUNK),
                import: Default::default(),
            };
            config::write_config(&path, &written, force)?;
            ui::success(&format!("Wrote {}", path.display()));
            ui::info("Database", &database.display().to_string());
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Existing,
    Create,
}

fn resolve_database(flag: Option<PathBuf>, config: &SnapimportConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = flag.or_else(|| config.database.as_ref().map(PathBuf::from)) {
        return Ok(path);
    }
    Ok(config::default_database_path_in(&std::env::current_dir()?))
}

async fn run_import(file: &Path, database: &Path, options: ImportOptions, mode: Mode) -> anyhow::Result<()> {
    let reader = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("opening {}", file.display()))?;
    let stream = JsonExportStream::new(reader);
    let transactional = !options.no_transaction;

    ui::header(&format!("Importing {} into {}", file.display(), database.display()));

    // Ctrl-C is only a request; the import stops at its next progress checkpoint
    let abort = Arc::new(AtomicBool::new(false));
    let (mut bar, tx) = ImportProgressBar::new();
    {
        let abort = abort.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                abort.store(true, Ordering::SeqCst);
                tx.send(ProgressMessage::Aborting).ok();
            }
        });
    }

    let last = Arc::new(std::sync::Mutex::new(ImportProgress::default()));
    let observer = {
        let abort = abort.clone();
        let tx = tx.clone();
        let last = last.clone();
        move |progress: &ImportProgress| {
            tx.send(ProgressMessage::Progress(progress.clone())).ok();
            if let Ok(mut last) = last.lock() {
                *last = progress.clone();
            }
            abort.load(Ordering::SeqCst)
        }
    };
    let options = options.with_progress(observer);

    let started = Instant::now();
    let result = match mode {
        Mode::Create => {
            config::ensure_db_dir(database)?;
            import_database(Some(database), stream, options).await.map(|_| ())
        }
        Mode::Existing => {
            let mut db = SqliteDatabase::open(database)?;
            import_into(&mut db, stream, options).await
        }
    };

    tx.send(ProgressMessage::Exit).ok();
    bar.join();
    let progress = last.lock().map(|p| p.clone()).unwrap_or_default();

    match result {
        Ok(()) => {
            bar.finish_with_summary(started.elapsed(), progress.completed_rows, progress.completed_tables);
            Ok(())
        }
        Err(e) => {
            bar.clear();
            if mode == Mode::Create && transactional {
                std::fs::remove_file(database).ok();
            }
            if matches!(e, Error::Aborted) {
                if transactional {
                    ui::warn("Import aborted; no rows were kept");
                } else {
                    ui::warn(&format!("Import aborted after {} rows; written rows were kept", progress.completed_rows));
                }
            } else {
                ui::error(&e.to_string());
            }
            Err(e.into())
        }
    }
}
