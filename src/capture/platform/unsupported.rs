use std::time::Duration;

use crate::capture::buffer::PixelBuffer;
use crate::capture::region::{
    CaptureRegion, MonitorDescriptor, MonitorEnumerator, WindowLookup, WindowRef,
};
use crate::capture::source::{AcquireOutcome, CaptureBackend, DuplicationSession};
use crate::error::{DeskshotError, Result};

const UNSUPPORTED: &str = "screen capture is only supported on Windows";

/// Uninhabited: no duplication session can exist on this platform.
pub enum NoSession {}

impl DuplicationSession for NoSession {
    fn output_bounds(&self) -> CaptureRegion {
        match *self {}
    }

    fn has_duplication(&self) -> bool {
        match *self {}
    }

    fn acquire(&mut self, _timeout: Duration) -> Result<AcquireOutcome> {
        match *self {}
    }

    fn recreate_duplication(&mut self) -> Result<()> {
        match *self {}
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedBackend;

impl CaptureBackend for UnsupportedBackend {
    type Session = NoSession;

    fn is_remote_session(&self) -> bool {
        false
    }

    fn open_duplication(&self) -> Result<NoSession> {
        Err(DeskshotError::resource_init(UNSUPPORTED))
    }

    fn primary_bounds(&self) -> Result<CaptureRegion> {
        Err(DeskshotError::capture_failed(UNSUPPORTED))
    }

    fn blit(&self, _region: &CaptureRegion) -> Result<PixelBuffer> {
        Err(DeskshotError::capture_failed(UNSUPPORTED))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedMonitors;

impl MonitorEnumerator for UnsupportedMonitors {
    fn monitors(&self) -> Result<Vec<MonitorDescriptor>> {
        Ok(Vec::new())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedWindows;

impl WindowLookup for UnsupportedWindows {
    fn bounds(&self, window: &WindowRef) -> Result<CaptureRegion> {
        Err(DeskshotError::WindowNotFound(window.to_string()))
    }
}
