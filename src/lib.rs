//! deskshot: screen capture and template matching for desktop automation.
//!
//! Captures the primary output, a region, a window or a monitor (GPU desktop
//! duplication with a GDI fallback), optionally draws the cursor in, encodes
//! to PNG/JPEG and locates reference images in captured pixels with
//! normalized cross-correlation.

pub mod capture;
pub mod codec;
pub mod config;
pub mod coords;
pub mod error;
pub mod logging;
pub mod matching;
pub mod paths;

pub use capture::{
    CaptureOptions, CaptureRegion, CaptureTarget, Capturer, MonitorDescriptor, PixelBuffer,
    Screenshot, StrategyKind, WindowRef,
};
pub use codec::{EncodingKind, ImageFormat};
pub use error::{DeskshotError, ErrorClass, Result, UnavailableReason};
pub use matching::{CancellationToken, DEFAULT_THRESHOLD, MatchConfig, MatchResult};
