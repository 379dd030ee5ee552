//! Status sinks: live table and line log.

pub mod log;
pub mod table;

use crate::runtime::reporter::StatusSink;

pub use log::LogSink;
pub use table::TableSink;

/// Output mode requested on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Auto,
    Table,
    Log,
}

/// `auto` resolves against stdout interactivity.
pub fn resolve_output(mode: OutputMode, is_tty: bool) -> OutputMode {
    match mode {
        OutputMode::Auto => {
            if is_tty {
                OutputMode::Table
            } else {
                OutputMode::Log
            }
        }
        other => other,
    }
}

/// Build the sink for a resolved output mode.
pub fn build_sink(mode: OutputMode, is_tty: bool, verbose: bool) -> Box<dyn StatusSink> {
    match resolve_output(mode, is_tty) {
        OutputMode::Table => Box::new(TableSink::new()),
        _ => Box::new(LogSink::new(verbose)),
    }
}
