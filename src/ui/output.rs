use crate::output::is_quiet;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    if is_quiet() {
        return;
    }
    println!("{}{}", theme().glyph(Icons::IMPORT), text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{}{}", theme().glyph(Icons::CHECK), label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{}{}", theme().glyph(Icons::CROSS), label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{}{}", theme().glyph(Icons::WARN), label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    if is_quiet() {
        return;
    }
    println!(
        "{}{}: {}",
        theme().glyph(Icons::INFO).style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn section(title: &str) {
    if is_quiet() {
        return;
    }
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}
