use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};

use console::style;
use vitehost::{LogLevel, ScopedLog};

static VERBOSE: AtomicBool = AtomicBool::new(false);

fn accent<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).cyan()
}

fn muted_style<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).dim()
}

pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn step(message: &str) {
    println!("{} {}", accent("•").bold(), message);
}

pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

pub fn error_stderr(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

pub fn muted(message: &str) {
    println!("{}", muted_style(message));
}

/// `HH:MM:SS LEVEL [scope] message`. Debug entries only show with --verbose.
pub fn log_entry(entry: &ScopedLog) {
    if entry.level == LogLevel::Debug && !is_verbose() {
        return;
    }
    println!("{}", entry);
}
