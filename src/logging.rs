//! Tracing subscriber setup.
//!
//! Log lines go to stderr and, when enabled, are appended to
//! `<exe_dir>/logs/deskshot.log` with a local wall-clock timestamp.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::fmt::{self, format::Writer, time::FormatTime};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const LOG_FILE_NAME: &str = "deskshot.log";

/// Formats event timestamps as `HH:MM:SS.mmm` in local time.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%H:%M:%S%.3f"))
    }
}

fn open_log_file() -> Option<File> {
    let dir = crate::paths::logs_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Could not create log directory {}: {}", dir.display(), e);
        return None;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))
        .ok()
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. Calling this more than once is harmless.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let stderr_layer = fmt::layer()
        .with_timer(LocalTimer)
        .with_target(true)
        .with_writer(std::io::stderr);

    let file_layer = config
        .file
        .then(open_log_file)
        .flatten()
        .map(|file| {
            fmt::layer()
                .with_timer(LocalTimer)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
}
