use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles and glyph policy for CLI output
#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    pub info: Style,
    pub dim: Style,
    /// Prefix status lines with glyphs
    pub glyphs: bool,
}

impl Theme {
    pub fn detect() -> Self {
        Self::for_output(console::Term::stdout().is_term(), crate::output::is_quiet())
    }

    /// Color and glyphs only on an interactive, non-quiet terminal
    pub fn for_output(is_term: bool, quiet: bool) -> Self {
        if !is_term || quiet {
            return Self::plain();
        }
        Self {
            header: Style::new().cyan().bold(),
            success: Style::new().green().bold(),
            error: Style::new().red().bold(),
            warn: Style::new().yellow().bold(),
            info: Style::new().magenta(),
            dim: Style::new().white().dimmed(),
            glyphs: true,
        }
    }

    pub fn plain() -> Self {
        Self {
            header: Style::new(),
            success: Style::new(),
            error: Style::new(),
            warn: Style::new(),
            info: Style::new(),
            dim: Style::new(),
            glyphs: false,
        }
    }

    /// `icon` followed by a space, or nothing in plain output
    pub fn glyph(&self, icon: &str) -> String {
        if self.glyphs {
            format!("{} ", icon)
        } else {
            String::new()
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}

pub struct Icons;

impl Icons {
    pub const IMPORT: &str = "📥";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const DATABASE: &str = "🗄️";
    pub const TABLE: &str = "📋";
}
