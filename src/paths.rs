//! Files deskshot reads and writes, all rooted at the executable's directory.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::codec::ImageFormat;

static APP_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Directory holding the running executable, or `.` if it cannot be
/// determined.
pub fn app_dir() -> &'static Path {
    APP_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

pub fn logs_dir() -> PathBuf {
    app_dir().join("logs")
}

/// Default destination for saved captures.
pub fn screenshots_dir() -> PathBuf {
    app_dir().join("screenshots")
}

pub fn config_path() -> PathBuf {
    app_dir().join("config.json")
}

/// `deskshot_YYYYmmdd_HHMMSS.<ext>` for a capture taken at `captured_at`.
pub fn screenshot_file_name(captured_at: &DateTime<Local>, format: ImageFormat) -> String {
    format!(
        "deskshot_{}.{}",
        captured_at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Creates `logs/` and `screenshots/` if missing.
pub fn ensure_directories() -> std::io::Result<()> {
    for dir in [logs_dir(), screenshots_dir()] {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}
