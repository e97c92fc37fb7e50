//! Monitor enumeration via `EnumDisplayMonitors`.

use anyhow::anyhow;
use std::mem::size_of;

use windows::Win32::Foundation::{BOOL, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFO, MONITORINFOEXW,
    MONITORINFOF_PRIMARY,
};
use windows::Win32::UI::HiDpi::{GetDpiForMonitor, MDT_EFFECTIVE_DPI};

use crate::capture::region::{CaptureRegion, MonitorDescriptor, MonitorEnumerator};
use crate::coords::DEFAULT_DPI;
use crate::error::{DeskshotError, Result};

fn utf16z_to_string(input: &[u16]) -> String {
    let len = input.iter().position(|&ch| ch == 0).unwrap_or(input.len());
    String::from_utf16_lossy(&input[..len])
}

fn rect_to_region(rect: RECT) -> anyhow::Result<CaptureRegion> {
    CaptureRegion::from_edges(rect.left, rect.top, rect.right, rect.bottom)
        .map_err(|e| anyhow!("invalid monitor rectangle: {}", e))
}

fn describe(index: usize, handle: HMONITOR) -> anyhow::Result<MonitorDescriptor> {
    let mut info = MONITORINFOEXW {
        monitorInfo: MONITORINFO {
            cbSize: size_of::<MONITORINFOEXW>() as u32,
            ..Default::default()
        },
        ..Default::default()
    };
    if !unsafe { GetMonitorInfoW(handle, (&mut info as *mut MONITORINFOEXW).cast()) }.as_bool() {
        return Err(anyhow!("GetMonitorInfoW failed for monitor {}", index));
    }

    let (mut dpi_x, mut dpi_y) = (DEFAULT_DPI, DEFAULT_DPI);
    if let Err(e) = unsafe { GetDpiForMonitor(handle, MDT_EFFECTIVE_DPI, &mut dpi_x, &mut dpi_y) } {
        tracing::debug!("GetDpiForMonitor failed for monitor {}: {}", index, e);
        dpi_x = DEFAULT_DPI;
        dpi_y = DEFAULT_DPI;
    }

    Ok(MonitorDescriptor {
        index,
        name: utf16z_to_string(&info.szDevice),
        bounds: rect_to_region(info.monitorInfo.rcMonitor)?,
        work_area: rect_to_region(info.monitorInfo.rcWork)?,
        is_primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
        dpi_x,
        dpi_y,
        scale_factor: dpi_x as f64 / DEFAULT_DPI as f64,
        handle: handle.0 as isize,
    })
}

/// Enumerates the attached monitors on every call.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowsMonitors;

impl MonitorEnumerator for WindowsMonitors {
    fn monitors(&self) -> Result<Vec<MonitorDescriptor>> {
        unsafe extern "system" fn enum_callback(
            handle: HMONITOR,
            _dc: HDC,
            _rect: *mut RECT,
            lparam: LPARAM,
        ) -> BOOL {
            unsafe {
                let handles = &mut *(lparam.0 as *mut Vec<HMONITOR>);
                handles.push(handle);
            }
            TRUE
        }

        let mut handles: Vec<HMONITOR> = Vec::new();
        let ok = unsafe {
            EnumDisplayMonitors(
                HDC::default(),
                None,
                Some(enum_callback),
                LPARAM(&mut handles as *mut _ as isize),
            )
        };
        if !ok.as_bool() {
            return Err(DeskshotError::Platform(anyhow!("EnumDisplayMonitors failed")));
        }

        let monitors = handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| describe(index, handle))
            .collect::<anyhow::Result<Vec<_>>>()?;
        tracing::debug!("Enumerated {} monitor(s)", monitors.len());
        Ok(monitors)
    }
}
