//! Coordinate conversion utilities.
//!
//! Everything here is pure arithmetic over virtual-desktop pixels: window
//! offsets, rectangle centers, monitor lookup, DPI scaling and the
//! `[0, 65536)` normalization used for absolute input injection.

use crate::capture::region::{CaptureRegion, MonitorDescriptor};
use crate::error::{DeskshotError, Result};

/// DPI at which a monitor's scale factor is 1.0.
pub const DEFAULT_DPI: u32 = 96;

/// Size of the absolute input coordinate space on each axis.
pub const ABSOLUTE_INPUT_RANGE: i64 = 65536;

/// Converts a point relative to a window's client origin to screen
/// coordinates.
pub fn window_to_screen(window: &CaptureRegion, x: i32, y: i32) -> (i32, i32) {
    (window.x + x, window.y + y)
}

/// Converts a screen point to coordinates relative to a window's client
/// origin. The result may be negative or exceed the window size.
pub fn screen_to_window(window: &CaptureRegion, x: i32, y: i32) -> (i32, i32) {
    (x - window.x, y - window.y)
}

/// Center of a rectangle, rounded toward the origin. Zero-size rectangles
/// return `(x, y)`.
pub fn center(x: i32, y: i32, width: i32, height: i32) -> (i32, i32) {
    (x + width / 2, y + height / 2)
}

impl CaptureRegion {
    pub fn center(&self) -> (i32, i32) {
        center(self.x, self.y, self.width as i32, self.height as i32)
    }
}

/// Bounding box of all monitors, or `None` when the list is empty.
pub fn virtual_desktop_bounds(monitors: &[MonitorDescriptor]) -> Option<CaptureRegion> {
    let first = monitors.first()?;
    let (mut left, mut top) = (first.bounds.x, first.bounds.y);
    let (mut right, mut bottom) = (first.bounds.right(), first.bounds.bottom());
    for m in &monitors[1..] {
        left = left.min(m.bounds.x);
        top = top.min(m.bounds.y);
        right = right.max(m.bounds.right());
        bottom = bottom.max(m.bounds.bottom());
    }
    CaptureRegion::from_edges(left, top, right, bottom).ok()
}

/// The monitor containing a virtual-desktop point.
pub fn monitor_at(monitors: &[MonitorDescriptor], x: i32, y: i32) -> Option<&MonitorDescriptor> {
    monitors.iter().find(|m| m.bounds.contains_point(x, y))
}

/// Normalizes a virtual-desktop point into `[0, 65536)` on each axis of
/// `desktop`. Points outside the desktop are clamped to its edges.
pub fn to_absolute_input(x: i32, y: i32, desktop: &CaptureRegion) -> (i32, i32) {
    fn axis(value: i32, origin: i32, extent: u32) -> i32 {
        let offset = (value as i64 - origin as i64).clamp(0, extent as i64 - 1);
        (offset * ABSOLUTE_INPUT_RANGE / extent as i64) as i32
    }
    (
        axis(x, desktop.x, desktop.width),
        axis(y, desktop.y, desktop.height),
    )
}

/// Converts a physical pixel position on `monitor` to the logical
/// (DPI-unaware) position an application scaled by the monitor would see.
pub fn physical_to_logical(monitor: &MonitorDescriptor, x: i32, y: i32) -> (i32, i32) {
    let scale = effective_scale(monitor);
    let (ox, oy) = monitor.bounds.origin();
    (
        ox + ((x - ox) as f64 / scale).round() as i32,
        oy + ((y - oy) as f64 / scale).round() as i32,
    )
}

/// Inverse of [`physical_to_logical`].
pub fn logical_to_physical(monitor: &MonitorDescriptor, x: i32, y: i32) -> (i32, i32) {
    let scale = effective_scale(monitor);
    let (ox, oy) = monitor.bounds.origin();
    (
        ox + ((x - ox) as f64 * scale).round() as i32,
        oy + ((y - oy) as f64 * scale).round() as i32,
    )
}

fn effective_scale(monitor: &MonitorDescriptor) -> f64 {
    if monitor.scale_factor.is_finite() && monitor.scale_factor > 0.0 {
        monitor.scale_factor
    } else {
        1.0
    }
}

/// Converts a screen point to fractions (0.0-1.0) of a window's client area.
///
/// Returns an error if the point is outside the client area.
pub fn relative_to_window(window: &CaptureRegion, x: i32, y: i32) -> Result<(f64, f64)> {
    if !window.contains_point(x, y) {
        return Err(DeskshotError::invalid_argument(format!(
            "point ({}, {}) is outside window bounds {:?}",
            x, y, window
        )));
    }
    let (cx, cy) = screen_to_window(window, x, y);
    Ok((
        cx as f64 / window.width as f64,
        cy as f64 / window.height as f64,
    ))
}

/// Converts client-area fractions back to a screen point.
pub fn window_from_relative(window: &CaptureRegion, rel_x: f64, rel_y: f64) -> (i32, i32) {
    let cx = (rel_x * window.width as f64).floor() as i32;
    let cy = (rel_y * window.height as f64).floor() as i32;
    window_to_screen(window, cx, cy)
}
