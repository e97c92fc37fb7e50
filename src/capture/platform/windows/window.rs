//! Window lookup: title search with `EnumWindows` and client-area bounds.

use anyhow::anyhow;
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;

use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT, TRUE};
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetWindowTextLengthW, GetWindowTextW, IsWindow, IsWindowVisible,
};

use crate::capture::region::{CaptureRegion, WindowLookup, WindowRef};
use crate::error::{DeskshotError, Result};

fn window_title(hwnd: HWND) -> String {
    unsafe {
        let len = GetWindowTextLengthW(hwnd);
        if len <= 0 {
            return String::new();
        }
        let mut buf: Vec<u16> = vec![0; (len + 1) as usize];
        let copied = GetWindowTextW(hwnd, &mut buf);
        OsString::from_wide(&buf[..copied.max(0) as usize])
            .to_string_lossy()
            .to_string()
    }
}

/// First visible top-level window whose title contains `needle`
/// (case-insensitive).
fn find_by_title(needle: &str) -> Option<HWND> {
    struct EnumData {
        needle: String,
        hwnd: Option<HWND>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        unsafe {
            let data = &mut *(lparam.0 as *mut EnumData);
            if !IsWindowVisible(hwnd).as_bool() {
                return TRUE;
            }
            let title = window_title(hwnd);
            if title.is_empty() {
                return TRUE;
            }
            if title.to_lowercase().contains(&data.needle) {
                tracing::debug!("Matched window \"{}\"", title);
                data.hwnd = Some(hwnd);
                return BOOL(0);
            }
            TRUE
        }
    }

    let mut data = EnumData {
        needle: needle.to_lowercase(),
        hwnd: None,
    };
    unsafe {
        // EnumWindows reports an error when the callback stops early.
        let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
    }
    data.hwnd
}

/// Client area of `hwnd` in screen coordinates.
fn client_bounds(hwnd: HWND) -> anyhow::Result<CaptureRegion> {
    let mut rect = RECT::default();
    unsafe { GetClientRect(hwnd, &mut rect)? };

    let mut origin = POINT { x: 0, y: 0 };
    if !unsafe { ClientToScreen(hwnd, &mut origin) }.as_bool() {
        return Err(anyhow!("ClientToScreen failed"));
    }

    CaptureRegion::new(
        origin.x,
        origin.y,
        rect.right - rect.left,
        rect.bottom - rect.top,
    )
    .map_err(|e| anyhow!("window has an empty client area: {}", e))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WindowsWindows;

impl WindowLookup for WindowsWindows {
    fn bounds(&self, window: &WindowRef) -> Result<CaptureRegion> {
        let hwnd = match window {
            WindowRef::Handle(h) => {
                let hwnd = HWND(*h as *mut _);
                if !unsafe { IsWindow(hwnd) }.as_bool() {
                    return Err(DeskshotError::WindowNotFound(window.to_string()));
                }
                hwnd
            }
            WindowRef::Title(title) => find_by_title(title)
                .ok_or_else(|| DeskshotError::WindowNotFound(window.to_string()))?,
        };

        client_bounds(hwnd).map_err(|e| {
            tracing::warn!("Could not resolve bounds for {}: {}", window, e);
            DeskshotError::invalid_argument(format!("window {}: {}", window, e))
        })
    }
}
