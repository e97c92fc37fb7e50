//! Rectangles, monitors and window references in virtual-desktop coordinates.

use serde::{Deserialize, Serialize};

use crate::error::{DeskshotError, Result};

/// An axis-aligned rectangle in virtual-desktop pixels.
///
/// The origin may be negative on layouts with monitors to the left of or
/// above the primary display. Width and height are always positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

fn edge(origin: i32, extent: u32) -> i32 {
    (origin as i64 + extent as i64).clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl CaptureRegion {
    /// Validated constructor. Zero or negative sizes are rejected, as are
    /// regions whose right or bottom edge would overflow `i32`.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(DeskshotError::invalid_argument(format!(
                "capture region must have positive size, got {}x{}",
                width, height
            )));
        }
        if x.checked_add(width).is_none() || y.checked_add(height).is_none() {
            return Err(DeskshotError::invalid_argument(format!(
                "capture region {}x{} at ({}, {}) extends past the coordinate range",
                width, height, x, y
            )));
        }
        Ok(Self {
            x,
            y,
            width: width as u32,
            height: height as u32,
        })
    }

    /// Builds a region from left/top/right/bottom edges (exclusive right/bottom).
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Result<Self> {
        let (Some(width), Some(height)) = (right.checked_sub(left), bottom.checked_sub(top)) else {
            return Err(DeskshotError::invalid_argument(format!(
                "edges ({}, {}, {}, {}) span more than the coordinate range",
                left, top, right, bottom
            )));
        };
        Self::new(left, top, width, height)
    }

    // Fields are public, so a hand-built region may still reach past i32;
    // edges saturate rather than wrap.
    pub fn right(&self) -> i32 {
        edge(self.x, self.width)
    }

    pub fn bottom(&self) -> i32 {
        edge(self.y, self.height)
    }

    pub fn origin(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// True when `other` lies entirely inside this region.
    pub fn contains(&self, other: &CaptureRegion) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Position of this region relative to `outer`'s origin, for cropping a
    /// buffer that covers `outer`. Fails when this region is not inside `outer`.
    pub fn offset_within(&self, outer: &CaptureRegion) -> Result<(u32, u32)> {
        if !outer.contains(self) {
            return Err(DeskshotError::invalid_argument(format!(
                "region {:?} is outside {:?}",
                self, outer
            )));
        }
        Ok((
            (self.x as i64 - outer.x as i64) as u32,
            (self.y as i64 - outer.y as i64) as u32,
        ))
    }
}

/// A physical display as reported by the monitor-enumeration collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitorDescriptor {
    /// Zero-based enumeration order
    pub index: usize,
    pub name: String,
    /// Full monitor bounds in virtual-desktop pixels
    pub bounds: CaptureRegion,
    /// Bounds excluding taskbars and docked toolbars
    pub work_area: CaptureRegion,
    pub is_primary: bool,
    pub dpi_x: u32,
    pub dpi_y: u32,
    /// dpi / 96 (1.0, 1.25, 1.5, 2.0 ...)
    pub scale_factor: f64,
    /// Opaque platform handle (HMONITOR on Windows)
    pub handle: isize,
}

/// Identifies a top-level window for `capture_window`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowRef {
    /// Native window handle
    Handle(isize),
    /// Case-insensitive substring of the window title
    Title(String),
}

impl std::fmt::Display for WindowRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handle(h) => write!(f, "handle {:#x}", h),
            Self::Title(t) => write!(f, "\"{}\"", t),
        }
    }
}

/// Window-management collaborator: resolves a window to its client-area
/// bounds in screen coordinates.
pub trait WindowLookup: Send + Sync {
    fn bounds(&self, window: &WindowRef) -> Result<CaptureRegion>;
}

/// Monitor-enumeration collaborator. Enumerates on every call; topology can
/// change between calls.
pub trait MonitorEnumerator: Send + Sync {
    fn monitors(&self) -> Result<Vec<MonitorDescriptor>>;
}
