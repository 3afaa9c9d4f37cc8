use crate::ui::progress_message::ProgressMessage;
use crate::ui::theme;
use crate::ui::Icons;
use indicatif::{HumanDuration, MultiProgress, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::thread;
use std::time::Duration;

/// Row and table bars driven from a background thread
pub struct ImportProgressBar {
    mp: MultiProgress,
    rows: ProgressBar,
    tables: ProgressBar,
    handle: Option<thread::JoinHandle<()>>,
}

impl ImportProgressBar {
    pub fn new() -> (Self, crossbeam::channel::Sender<ProgressMessage>) {
        let (tx, rx) = crossbeam::channel::unbounded::<ProgressMessage>();
        let visible = console::Term::stdout().is_term() && !crate::output::is_quiet();

        let mp = MultiProgress::new();
        let rows = if visible {
            mp.add(ProgressBar::new(0).with_message("Importing rows"))
        } else {
            ProgressBar::hidden()
        };
        rows.set_style(
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        let tables = if visible {
            mp.add(ProgressBar::new(0).with_message("Tables"))
        } else {
            ProgressBar::hidden()
        };

        let rows_clone = rows.clone();
        let tables_clone = tables.clone();
        let handle = thread::spawn(move || {
            for msg in rx {
                match msg {
                    ProgressMessage::Progress(progress) => {
                        if let Some(total) = progress.total_rows {
                            rows_clone.set_length(total);
                        }
                        rows_clone.set_position(progress.completed_rows);
                        tables_clone.set_length(progress.total_tables as u64);
                        tables_clone.set_position(progress.completed_tables as u64);
                        if progress.done {
                            rows_clone.finish_with_message("Done");
                            tables_clone.finish_with_message("Done");
                        }
                    }
                    ProgressMessage::Aborting => {
                        rows_clone.set_message("Aborting");
                    }
                    ProgressMessage::Exit => break,
                }
            }
        });

        (
            Self {
                mp,
                rows,
                tables,
                handle: Some(handle),
            },
            tx,
        )
    }

    /// Wait for the progress thread. Send [`ProgressMessage::Exit`] first.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }

    pub fn clear(&self) {
        self.rows.finish_and_clear();
        self.tables.finish_and_clear();
        self.mp.clear().ok();
    }

    pub fn finish_with_summary(&self, duration: Duration, rows: u64, tables: usize) {
        self.clear();
        if crate::output::is_quiet() {
            return;
        }
        println!();
        println!(
            "{}{}",
            theme().glyph(Icons::CHECK),
            format!("Complete in {}", HumanDuration(duration)).style(theme().success.clone())
        );
        println!(
            "  {}{} rows  {}{} tables",
            theme().glyph(Icons::DATABASE),
            rows,
            theme().glyph(Icons::TABLE),
            tables
        );
    }
}

pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = if crate::output::is_quiet() {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        pb.set_message(message.to_string());
        if console::Term::stdout().is_term() {
            pb.enable_steady_tick(Duration::from_millis(100));
        }
        Self { pb }
    }

    pub fn finish_and_clear(&self) {
        self.pb.finish_and_clear();
    }
}
