pub mod output;
pub mod progress;
pub mod progress_message;
pub mod table;
pub mod theme;

pub use output::{error, header, info, section, success, summary_row, warn};
pub use progress::{ImportProgressBar, Spinner};
pub use progress_message::ProgressMessage;
pub use table::{header_table, stats_table};
pub use theme::{theme, Icons, Theme};
