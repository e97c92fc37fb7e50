//! Windows implementations of the capture collaborators.

mod cursor;
mod duplication;
mod gdi;
mod monitor;
mod window;

pub use cursor::WindowsCursor;
pub use duplication::DuplicationCapturer;
pub use monitor::WindowsMonitors;
pub use window::WindowsWindows;

use windows::Win32::UI::WindowsAndMessaging::{
    GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN, SM_REMOTESESSION,
};

use crate::capture::buffer::PixelBuffer;
use crate::capture::region::CaptureRegion;
use crate::capture::source::CaptureBackend;
use crate::error::{DeskshotError, Result};

/// DXGI duplication with a GDI fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowsBackend;

impl CaptureBackend for WindowsBackend {
    type Session = DuplicationCapturer;

    fn is_remote_session(&self) -> bool {
        unsafe { GetSystemMetrics(SM_REMOTESESSION) != 0 }
    }

    fn open_duplication(&self) -> Result<DuplicationCapturer> {
        DuplicationCapturer::open()
    }

    fn primary_bounds(&self) -> Result<CaptureRegion> {
        let (width, height) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        CaptureRegion::new(0, 0, width, height)
    }

    fn blit(&self, region: &CaptureRegion) -> Result<PixelBuffer> {
        gdi::blit_region(region).map_err(|e| DeskshotError::capture_failed(format!("{:#}", e)))
    }
}
