//! Screen capture: frame acquisition, cursor overlay and encoding.
//!
//! This module provides:
//! - [`Capturer`], the entry point for full-screen, region, window and
//!   monitor captures
//! - [`FrameSource`], GPU duplication with a software fallback
//! - Collaborator traits for cursor, monitor and window lookup

pub mod buffer;
pub mod cursor;
pub mod options;
pub mod platform;
pub mod region;
pub mod source;

pub use buffer::{PixelBuffer, PixelFormat};
pub use cursor::{CursorProvider, CursorSnapshot};
pub use options::{CaptureOptions, Screenshot};
pub use region::{CaptureRegion, MonitorDescriptor, MonitorEnumerator, WindowLookup, WindowRef};
pub use source::{CaptureBackend, Frame, FrameSource, SourceSettings, StrategyKind};

use chrono::Local;

use crate::config::CaptureConfig;
use crate::error::{DeskshotError, Result};
use platform::{SystemBackend, SystemCursor, SystemMonitors, SystemWindows};

/// What to capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureTarget {
    /// The primary output
    Primary,
    /// A virtual-desktop rectangle
    Region(CaptureRegion),
    /// A window's client area
    Window(WindowRef),
    /// A monitor by enumeration index
    Monitor(usize),
}

impl CaptureTarget {
    /// Full-screen captures default to bounded lossy output; the rest keep
    /// native pixels.
    pub fn default_options(&self) -> CaptureOptions {
        match self {
            Self::Primary => CaptureOptions::default(),
            _ => CaptureOptions::region_default(),
        }
    }
}

/// Capture entry point. Shareable across threads; GPU acquisition is
/// serialized internally.
pub struct Capturer<B: CaptureBackend = SystemBackend> {
    source: FrameSource<B>,
    cursor: Box<dyn CursorProvider>,
    monitors: Box<dyn MonitorEnumerator>,
    windows: Box<dyn WindowLookup>,
}

impl Capturer<SystemBackend> {
    /// Platform capturer configured from the global config.
    pub fn new() -> Self {
        Self::from_config(&crate::config::get_config().capture)
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::with_backend(SystemBackend::default(), SourceSettings::from_config(config))
            .with_cursor(SystemCursor::default())
            .with_monitors(SystemMonitors::default())
            .with_windows(SystemWindows::default())
    }
}

impl Default for Capturer<SystemBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: CaptureBackend> Capturer<B> {
    /// Capturer over a custom backend. Cursor, monitor and window lookup
    /// default to the platform implementations until replaced.
    pub fn with_backend(backend: B, settings: SourceSettings) -> Self {
        Self {
            source: FrameSource::new(backend, settings),
            cursor: Box::new(SystemCursor::default()),
            monitors: Box::new(SystemMonitors::default()),
            windows: Box::new(SystemWindows::default()),
        }
    }

    pub fn with_cursor(mut self, cursor: impl CursorProvider + 'static) -> Self {
        self.cursor = Box::new(cursor);
        self
    }

    pub fn with_monitors(mut self, monitors: impl MonitorEnumerator + 'static) -> Self {
        self.monitors = Box::new(monitors);
        self
    }

    pub fn with_windows(mut self, windows: impl WindowLookup + 'static) -> Self {
        self.windows = Box::new(windows);
        self
    }

    pub fn source(&self) -> &FrameSource<B> {
        &self.source
    }

    /// Current monitor layout. Enumerated on every call.
    pub fn monitors(&self) -> Result<Vec<MonitorDescriptor>> {
        self.monitors.monitors()
    }

    /// Resolves a target to virtual-desktop bounds. `None` means the
    /// primary output.
    pub fn resolve(&self, target: &CaptureTarget) -> Result<Option<CaptureRegion>> {
        match target {
            CaptureTarget::Primary => Ok(None),
            CaptureTarget::Region(region) => Ok(Some(*region)),
            CaptureTarget::Window(window) => {
                let bounds = self.windows.bounds(window)?;
                tracing::debug!("Window {} resolved to {:?}", window, bounds);
                Ok(Some(bounds))
            }
            CaptureTarget::Monitor(index) => {
                let monitors = self.monitors.monitors()?;
                let monitor = monitors
                    .iter()
                    .find(|m| m.index == *index)
                    .ok_or(DeskshotError::MonitorNotFound(*index))?;
                Ok(Some(monitor.bounds))
            }
        }
    }

    /// Raw pixels for a target, optionally with the cursor drawn in.
    pub fn capture_frame(&self, target: &CaptureTarget, include_cursor: bool) -> Result<Frame> {
        let mut frame = match self.resolve(target)? {
            None => self.source.capture_full()?,
            Some(region) => self.source.capture_region(region)?,
        };
        if include_cursor {
            self.overlay_cursor(&mut frame);
        }
        Ok(frame)
    }

    fn overlay_cursor(&self, frame: &mut Frame) {
        match self.cursor.current() {
            Ok(Some(snapshot)) => {
                if !cursor::composite(&mut frame.pixels, frame.region.origin(), &snapshot) {
                    tracing::debug!("Cursor outside captured region");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Cursor query failed, capturing without it: {}", e),
        }
    }

    /// Captures and encodes a target. `None` options select the target's
    /// defaults.
    pub fn capture_target(
        &self,
        target: &CaptureTarget,
        options: Option<CaptureOptions>,
    ) -> Result<Screenshot> {
        let options = options.unwrap_or_else(|| target.default_options());
        options.validate()?;

        let frame = self.capture_frame(target, options.include_cursor)?;
        let encoded = crate::codec::encode(&frame.pixels, &options.resolved_for(frame.pixels.dimensions()))?;
        tracing::info!(
            "Captured {}x{} via {} -> {}x{} {}",
            frame.region.width,
            frame.region.height,
            frame.strategy,
            encoded.width,
            encoded.height,
            encoded.format.mime_type()
        );

        Ok(Screenshot {
            bytes: encoded.bytes,
            format: encoded.format,
            width: encoded.width,
            height: encoded.height,
            captured_at: Local::now(),
            origin: frame.region,
            strategy: frame.strategy,
        })
    }

    /// Primary output.
    pub fn capture(&self, options: Option<CaptureOptions>) -> Result<Screenshot> {
        self.capture_target(&CaptureTarget::Primary, options)
    }

    /// Rectangle of the virtual desktop. Zero or negative sizes are rejected
    /// before any capture work.
    pub fn capture_region(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        options: Option<CaptureOptions>,
    ) -> Result<Screenshot> {
        let region = CaptureRegion::new(x, y, width, height)?;
        self.capture_target(&CaptureTarget::Region(region), options)
    }

    pub fn capture_window(
        &self,
        window: &WindowRef,
        options: Option<CaptureOptions>,
    ) -> Result<Screenshot> {
        self.capture_target(&CaptureTarget::Window(window.clone()), options)
    }

    pub fn capture_monitor(
        &self,
        index: usize,
        options: Option<CaptureOptions>,
    ) -> Result<Screenshot> {
        self.capture_target(&CaptureTarget::Monitor(index), options)
    }

    /// Unencoded primary output for matching.
    pub fn capture_buffer(&self, include_cursor: bool) -> Result<Frame> {
        self.capture_frame(&CaptureTarget::Primary, include_cursor)
    }

    pub fn capture_region_buffer(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        include_cursor: bool,
    ) -> Result<Frame> {
        let region = CaptureRegion::new(x, y, width, height)?;
        self.capture_frame(&CaptureTarget::Region(region), include_cursor)
    }
}
