//! OS-specific capture backends.
//!
//! Windows gets DXGI duplication with a GDI fallback plus cursor, monitor and
//! window lookup. On other targets capture reports itself unsupported and the
//! codec and matcher still work.

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use self::windows::{
    WindowsBackend as SystemBackend, WindowsCursor as SystemCursor,
    WindowsMonitors as SystemMonitors, WindowsWindows as SystemWindows,
};

#[cfg(not(windows))]
mod unsupported;

#[cfg(not(windows))]
pub use self::unsupported::{
    UnsupportedBackend as SystemBackend, UnsupportedMonitors as SystemMonitors,
    UnsupportedWindows as SystemWindows,
};

#[cfg(not(windows))]
pub use crate::capture::cursor::NoCursor as SystemCursor;
