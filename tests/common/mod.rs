//! Scripted platform collaborators shared by the integration tests.

#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use deskshot::capture::cursor::{CursorProvider, CursorSnapshot};
use deskshot::capture::region::{MonitorEnumerator, WindowLookup};
use deskshot::capture::source::{AcquireOutcome, CaptureBackend, DuplicationSession};
use deskshot::capture::{Capturer, SourceSettings};
use deskshot::{CaptureRegion, DeskshotError, MonitorDescriptor, PixelBuffer, Result, WindowRef};

pub fn noise(x: u32, y: u32, seed: u32) -> u8 {
    let mut h = x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263) ^ seed;
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    (h >> 24) as u8
}

/// Opaque pseudo-random image; every window of a few pixels is unique.
pub fn noise_image(width: u32, height: u32, seed: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            noise(x, y, seed),
            noise(x, y, seed ^ 0xA5),
            noise(x, y, seed ^ 0x5A),
            255,
        ])
    })
}

pub fn crop(img: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> RgbaImage {
    image::imageops::crop_imm(img, x, y, width, height).to_image()
}

/// Virtual desktop backed by an image whose top-left is (0, 0). The primary
/// output covers the left `primary_width` columns.
pub struct ScriptedDesktop {
    pub image: RgbaImage,
    pub primary_width: u32,
    pub remote: bool,
    pub blits: Arc<AtomicUsize>,
    pub acquires: Arc<AtomicUsize>,
}

impl ScriptedDesktop {
    pub fn new(image: RgbaImage, primary_width: u32) -> Self {
        Self {
            image,
            primary_width,
            remote: false,
            blits: Arc::new(AtomicUsize::new(0)),
            acquires: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn desktop_bounds(&self) -> CaptureRegion {
        CaptureRegion::new(0, 0, self.image.width() as i32, self.image.height() as i32).unwrap()
    }

    fn primary(&self) -> CaptureRegion {
        CaptureRegion::new(0, 0, self.primary_width as i32, self.image.height() as i32).unwrap()
    }
}

pub struct ScriptedSession {
    bounds: CaptureRegion,
    frame: PixelBuffer,
    acquires: Arc<AtomicUsize>,
}

impl DuplicationSession for ScriptedSession {
    fn output_bounds(&self) -> CaptureRegion {
        self.bounds
    }

    fn has_duplication(&self) -> bool {
        true
    }

    fn acquire(&mut self, _timeout: Duration) -> Result<AcquireOutcome> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(AcquireOutcome::Frame(self.frame.clone()))
    }

    fn recreate_duplication(&mut self) -> Result<()> {
        Ok(())
    }
}

impl CaptureBackend for ScriptedDesktop {
    type Session = ScriptedSession;

    fn is_remote_session(&self) -> bool {
        self.remote
    }

    fn open_duplication(&self) -> Result<ScriptedSession> {
        let bounds = self.primary();
        let frame = PixelBuffer::from_rgba_image(crop(
            &self.image,
            0,
            0,
            bounds.width,
            bounds.height,
        ))?;
        Ok(ScriptedSession {
            bounds,
            frame,
            acquires: Arc::clone(&self.acquires),
        })
    }

    fn primary_bounds(&self) -> Result<CaptureRegion> {
        Ok(self.primary())
    }

    fn blit(&self, region: &CaptureRegion) -> Result<PixelBuffer> {
        self.blits.fetch_add(1, Ordering::SeqCst);
        let (x, y) = region.offset_within(&self.desktop_bounds())?;
        PixelBuffer::from_rgba_image(crop(&self.image, x, y, region.width, region.height))
    }
}

/// Cursor provider returning a fixed answer.
pub enum FakeCursor {
    Hidden,
    At(CursorSnapshot),
    Failing,
}

impl FakeCursor {
    /// Opaque red square with its hotspot at the top-left corner.
    pub fn red_square(x: i32, y: i32, size: u32) -> Self {
        Self::At(CursorSnapshot {
            x,
            y,
            hotspot_x: 0,
            hotspot_y: 0,
            image: RgbaImage::from_pixel(size, size, Rgba([255, 0, 0, 255])),
        })
    }
}

impl CursorProvider for FakeCursor {
    fn current(&self) -> Result<Option<CursorSnapshot>> {
        match self {
            Self::Hidden => Ok(None),
            Self::At(snapshot) => Ok(Some(snapshot.clone())),
            Self::Failing => Err(DeskshotError::Platform(anyhow::anyhow!("cursor query failed"))),
        }
    }
}

pub struct FakeMonitors(pub Vec<MonitorDescriptor>);

impl MonitorEnumerator for FakeMonitors {
    fn monitors(&self) -> Result<Vec<MonitorDescriptor>> {
        Ok(self.0.clone())
    }
}

pub fn monitor(index: usize, bounds: CaptureRegion, dpi: u32) -> MonitorDescriptor {
    MonitorDescriptor {
        index,
        name: format!("\\\\.\\DISPLAY{}", index + 1),
        bounds,
        work_area: bounds,
        is_primary: bounds.x == 0 && bounds.y == 0,
        dpi_x: dpi,
        dpi_y: dpi,
        scale_factor: dpi as f64 / 96.0,
        handle: index as isize + 1,
    }
}

/// Knows exactly one window, titled "Editor", by title or by handle 0x42.
pub struct FakeWindows {
    pub client: CaptureRegion,
}

impl WindowLookup for FakeWindows {
    fn bounds(&self, window: &WindowRef) -> Result<CaptureRegion> {
        match window {
            WindowRef::Handle(0x42) => Ok(self.client),
            WindowRef::Title(title) if "editor".contains(&title.to_lowercase()) => Ok(self.client),
            _ => Err(DeskshotError::WindowNotFound(window.to_string())),
        }
    }
}

pub fn settings() -> SourceSettings {
    SourceSettings {
        acquire_timeout: Duration::from_millis(50),
        allow_gpu: true,
    }
}

/// 320x120 desktop: a 200-wide primary output plus a 120-wide secondary
/// monitor to its right. One window client area at (40, 30, 80, 50).
pub fn two_monitor_capturer(cursor: FakeCursor) -> (Capturer<ScriptedDesktop>, RgbaImage) {
    let image = noise_image(320, 120, 7);
    let desktop = ScriptedDesktop::new(image.clone(), 200);
    let capturer = Capturer::with_backend(desktop, settings())
        .with_cursor(cursor)
        .with_monitors(FakeMonitors(vec![
            monitor(0, CaptureRegion::new(0, 0, 200, 120).unwrap(), 96),
            monitor(1, CaptureRegion::new(200, 0, 120, 120).unwrap(), 144),
        ]))
        .with_windows(FakeWindows {
            client: CaptureRegion::new(40, 30, 80, 50).unwrap(),
        });
    (capturer, image)
}
