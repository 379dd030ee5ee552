//! File logging setup.
//!
//! All tracing output goes to `.mqtt-sim/logs/mqtt-sim.log` in the current
//! working directory. Stdout is reserved for the status sink, so the
//! subscriber never writes to the console.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_DIR: &str = ".mqtt-sim/logs";
pub const DEFAULT_LOG_FILE: &str = "mqtt-sim.log";

/// Initialize the global tracing subscriber with a file writer.
///
/// Returns the resolved log path. `verbose` lowers the default level to
/// DEBUG; `RUST_LOG` still overrides either default.
pub fn init_file_logging(verbose: bool, log_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = log_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
    std::fs::create_dir_all(&dir)?;
    let log_path = dir.join(DEFAULT_LOG_FILE);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mqtt_sim={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(log_path)
}
