//! Frame acquisition with GPU duplication and a software fallback.
//!
//! [`FrameSource`] picks a strategy on first use and keeps it for its whole
//! lifetime. The GPU path is preferred; per-call failures on it (no new frame,
//! lost access) are served by the software path for that call only, while an
//! initialization failure pins the software path permanently.
//!
//! The platform work lives behind [`CaptureBackend`] and
//! [`DuplicationSession`], so the selection and recovery logic here runs
//! unchanged against scripted backends in tests.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capture::buffer::PixelBuffer;
use crate::capture::region::CaptureRegion;
use crate::config::CaptureConfig;
use crate::error::{DeskshotError, Result, UnavailableReason};

/// Which capture path produced a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// GPU desktop duplication
    Duplication,
    /// Software block transfer from the desktop DC
    Software,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplication => f.write_str("duplication"),
            Self::Software => f.write_str("software"),
        }
    }
}

/// Result of one acquire attempt on a duplication interface.
#[derive(Debug)]
pub enum AcquireOutcome {
    /// A full-output frame, already copied out of the staging surface
    Frame(PixelBuffer),
    /// No new frame within the timeout
    Timeout,
    /// Access to the output was lost. The session has released its
    /// duplication interface; the device is still valid.
    AccessLost,
}

/// GPU state for one output: device, duplication interface and staging
/// surface. Acquire and release are single-threaded per interface, so the
/// frame source holds each session behind a mutex.
pub trait DuplicationSession: Send {
    /// Bounds of the duplicated output in virtual-desktop pixels.
    fn output_bounds(&self) -> CaptureRegion;

    /// False after access loss until [`recreate_duplication`] succeeds.
    ///
    /// [`recreate_duplication`]: DuplicationSession::recreate_duplication
    fn has_duplication(&self) -> bool;

    fn acquire(&mut self, timeout: Duration) -> Result<AcquireOutcome>;

    /// Rebuilds only the duplication interface (and staging surface if the
    /// output size changed) on the existing device.
    fn recreate_duplication(&mut self) -> Result<()>;
}

/// Platform entry points used by [`FrameSource`].
pub trait CaptureBackend: Send + Sync {
    type Session: DuplicationSession;

    /// Remote and virtual sessions do not support duplication.
    fn is_remote_session(&self) -> bool;

    /// Creates the device on the adapter owning the primary output, the
    /// duplication interface and the staging surface.
    fn open_duplication(&self) -> Result<Self::Session>;

    /// Bounds of the primary output, used for full captures on the software
    /// path.
    fn primary_bounds(&self) -> Result<CaptureRegion>;

    /// Software capture of an arbitrary virtual-desktop rectangle.
    fn blit(&self, region: &CaptureRegion) -> Result<PixelBuffer>;
}

/// Tunables for [`FrameSource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceSettings {
    pub acquire_timeout: Duration,
    /// When false the GPU path is never attempted.
    pub allow_gpu: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}

impl SourceSettings {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            acquire_timeout: Duration::from_millis(u64::from(config.acquire_timeout_ms)),
            allow_gpu: !config.disable_gpu,
        }
    }
}

/// A captured frame and where it came from.
#[derive(Clone, Debug)]
pub struct Frame {
    pub pixels: PixelBuffer,
    /// Virtual-desktop rectangle covered by `pixels`
    pub region: CaptureRegion,
    pub strategy: StrategyKind,
}

enum Strategy<S> {
    Duplication(Mutex<S>),
    Software,
}

impl<S> Strategy<S> {
    fn kind(&self) -> StrategyKind {
        match self {
            Self::Duplication(_) => StrategyKind::Duplication,
            Self::Software => StrategyKind::Software,
        }
    }
}

pub struct FrameSource<B: CaptureBackend> {
    backend: B,
    settings: SourceSettings,
    strategy: Mutex<Option<Arc<Strategy<B::Session>>>>,
}

impl<B: CaptureBackend> FrameSource<B> {
    pub fn new(backend: B, settings: SourceSettings) -> Self {
        Self {
            backend,
            settings,
            strategy: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The selected strategy, or `None` before the first capture.
    pub fn strategy_kind(&self) -> Option<StrategyKind> {
        self.strategy
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|s| s.kind()))
    }

    fn strategy(&self) -> Result<Arc<Strategy<B::Session>>> {
        let mut slot = self
            .strategy
            .lock()
            .map_err(|_| DeskshotError::capture_failed("strategy lock poisoned"))?;
        if let Some(strategy) = slot.as_ref() {
            return Ok(Arc::clone(strategy));
        }
        let strategy = Arc::new(self.select_strategy());
        *slot = Some(Arc::clone(&strategy));
        Ok(strategy)
    }

    fn select_strategy(&self) -> Strategy<B::Session> {
        if !self.settings.allow_gpu {
            tracing::info!("GPU capture disabled by configuration, using software capture");
            return Strategy::Software;
        }
        if self.backend.is_remote_session() {
            tracing::info!("Remote session detected, using software capture");
            return Strategy::Software;
        }
        match self.backend.open_duplication() {
            Ok(session) => {
                let bounds = session.output_bounds();
                tracing::info!(
                    "Using GPU duplication for primary output {}x{} at ({}, {})",
                    bounds.width,
                    bounds.height,
                    bounds.x,
                    bounds.y
                );
                Strategy::Duplication(Mutex::new(session))
            }
            Err(e) => {
                tracing::warn!("GPU duplication init failed, using software capture: {}", e);
                Strategy::Software
            }
        }
    }

    /// Captures the primary output.
    pub fn capture_full(&self) -> Result<Frame> {
        let strategy = self.strategy()?;
        if let Strategy::Duplication(session) = strategy.as_ref() {
            if let Some(frame) = self.try_duplication(session, None) {
                return Ok(frame);
            }
        }
        let region = self
            .backend
            .primary_bounds()
            .map_err(|e| DeskshotError::capture_failed(format!("primary output bounds: {}", e)))?;
        self.software(region)
    }

    /// Captures a virtual-desktop rectangle. Regions not fully inside the
    /// primary output are always served by the software path.
    pub fn capture_region(&self, region: CaptureRegion) -> Result<Frame> {
        let strategy = self.strategy()?;
        if let Strategy::Duplication(session) = strategy.as_ref() {
            if let Some(frame) = self.try_duplication(session, Some(region)) {
                return Ok(frame);
            }
        }
        self.software(region)
    }

    /// One GPU attempt. `None` means the caller should use the software path
    /// for this call.
    fn try_duplication(
        &self,
        session: &Mutex<B::Session>,
        region: Option<CaptureRegion>,
    ) -> Option<Frame> {
        let mut session = match session.lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Duplication state poisoned, using software capture");
                return None;
            }
        };

        let bounds = session.output_bounds();
        if let Some(region) = region {
            if !bounds.contains(&region) {
                tracing::debug!("Region {:?} is outside the primary output", region);
                return None;
            }
        }

        match self.acquire(&mut *session) {
            Ok(pixels) => {
                let crop = match region {
                    Some(region) => region.offset_within(&bounds).and_then(|(x, y)| {
                        pixels.crop(x, y, region.width, region.height)
                    }),
                    None => Ok(pixels),
                };
                match crop {
                    Ok(pixels) => Some(Frame {
                        pixels,
                        region: region.unwrap_or(bounds),
                        strategy: StrategyKind::Duplication,
                    }),
                    Err(e) => {
                        tracing::warn!("Cropping duplicated frame failed: {}", e);
                        None
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                tracing::debug!("GPU capture unavailable for this call: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!("GPU capture failed, falling back to software: {}", e);
                None
            }
        }
    }

    fn acquire(&self, session: &mut B::Session) -> Result<PixelBuffer> {
        if !session.has_duplication() {
            tracing::debug!("Retrying duplication recreation");
            if let Err(e) = session.recreate_duplication() {
                tracing::warn!("Duplication recreation failed: {}", e);
                return Err(DeskshotError::Unavailable(UnavailableReason::AccessLost));
            }
        }

        match session.acquire(self.settings.acquire_timeout)? {
            AcquireOutcome::Frame(pixels) => Ok(pixels),
            AcquireOutcome::Timeout => {
                Err(DeskshotError::Unavailable(UnavailableReason::NoNewFrame))
            }
            AcquireOutcome::AccessLost => {
                tracing::warn!("Duplication access lost, recreating duplication interface");
                if let Err(e) = session.recreate_duplication() {
                    tracing::warn!(
                        "Duplication recreation failed, will retry on next capture: {}",
                        e
                    );
                }
                Err(DeskshotError::Unavailable(UnavailableReason::AccessLost))
            }
        }
    }

    fn software(&self, region: CaptureRegion) -> Result<Frame> {
        let pixels = self.backend.blit(&region).map_err(|e| match e {
            DeskshotError::CaptureFailed(_) => e,
            other => DeskshotError::capture_failed(format!("software capture failed: {}", other)),
        })?;
        tracing::debug!(
            "Software capture {}x{} at ({}, {})",
            region.width,
            region.height,
            region.x,
            region.y
        );
        Ok(Frame {
            pixels,
            region,
            strategy: StrategyKind::Software,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::buffer::PixelFormat;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GPU_COLOR: [u8; 4] = [0, 200, 0, 255];
    const SOFT_COLOR: [u8; 4] = [0, 0, 200, 255];

    #[derive(Clone, Copy, Debug)]
    enum Step {
        Frame,
        /// Frame delivered, but releasing it reported access loss
        FrameThenLost,
        Timeout,
        AccessLost,
        Fail,
    }

    #[derive(Default)]
    struct Counters {
        device_opens: AtomicUsize,
        recreates: AtomicUsize,
        acquires: AtomicUsize,
        blits: AtomicUsize,
    }

    struct FakeSession {
        bounds: CaptureRegion,
        script: VecDeque<Step>,
        recreate_failures: usize,
        has_duplication: bool,
        counters: Arc<Counters>,
    }

    impl DuplicationSession for FakeSession {
        fn output_bounds(&self) -> CaptureRegion {
            self.bounds
        }

        fn has_duplication(&self) -> bool {
            self.has_duplication
        }

        fn acquire(&mut self, _timeout: Duration) -> Result<AcquireOutcome> {
            self.counters.acquires.fetch_add(1, Ordering::SeqCst);
            let (width, height) = (self.bounds.width, self.bounds.height);
            let frame = move || PixelBuffer::solid(width, height, GPU_COLOR, PixelFormat::Bgra8).unwrap();
            match self.script.pop_front().unwrap_or(Step::Frame) {
                Step::Frame => Ok(AcquireOutcome::Frame(frame())),
                Step::FrameThenLost => {
                    let pixels = frame();
                    self.has_duplication = false;
                    Ok(AcquireOutcome::Frame(pixels))
                }
                Step::Timeout => Ok(AcquireOutcome::Timeout),
                Step::AccessLost => {
                    self.has_duplication = false;
                    Ok(AcquireOutcome::AccessLost)
                }
                Step::Fail => Err(DeskshotError::capture_failed("map failed")),
            }
        }

        fn recreate_duplication(&mut self) -> Result<()> {
            self.counters.recreates.fetch_add(1, Ordering::SeqCst);
            if self.recreate_failures > 0 {
                self.recreate_failures -= 1;
                return Err(DeskshotError::resource_init("output busy"));
            }
            self.has_duplication = true;
            Ok(())
        }
    }

    struct FakeBackend {
        remote: bool,
        init_fails: bool,
        blit_fails: bool,
        script: Vec<Step>,
        recreate_failures: usize,
        counters: Arc<Counters>,
    }

    impl FakeBackend {
        fn new(script: &[Step]) -> Self {
            Self {
                remote: false,
                init_fails: false,
                blit_fails: false,
                script: script.to_vec(),
                recreate_failures: 0,
                counters: Arc::new(Counters::default()),
            }
        }
    }

    fn primary() -> CaptureRegion {
        CaptureRegion::new(0, 0, 64, 48).unwrap()
    }

    impl CaptureBackend for FakeBackend {
        type Session = FakeSession;

        fn is_remote_session(&self) -> bool {
            self.remote
        }

        fn open_duplication(&self) -> Result<FakeSession> {
            self.counters.device_opens.fetch_add(1, Ordering::SeqCst);
            if self.init_fails {
                return Err(DeskshotError::resource_init("no output"));
            }
            Ok(FakeSession {
                bounds: primary(),
                script: self.script.iter().copied().collect(),
                recreate_failures: self.recreate_failures,
                has_duplication: true,
                counters: Arc::clone(&self.counters),
            })
        }

        fn primary_bounds(&self) -> Result<CaptureRegion> {
            Ok(primary())
        }

        fn blit(&self, region: &CaptureRegion) -> Result<PixelBuffer> {
            self.counters.blits.fetch_add(1, Ordering::SeqCst);
            if self.blit_fails {
                return Err(DeskshotError::Platform(anyhow::anyhow!("BitBlt failed")));
            }
            PixelBuffer::solid(region.width, region.height, SOFT_COLOR, PixelFormat::Bgra8)
        }
    }

    fn source(backend: FakeBackend) -> (FrameSource<FakeBackend>, Arc<Counters>) {
        let counters = Arc::clone(&backend.counters);
        (FrameSource::new(backend, SourceSettings::default()), counters)
    }

    #[test]
    fn test_settings_from_config() {
        let config = CaptureConfig {
            acquire_timeout_ms: 1250,
            disable_gpu: true,
            ..CaptureConfig::default()
        };
        let settings = SourceSettings::from_config(&config);
        assert_eq!(settings.acquire_timeout, Duration::from_millis(1250));
        assert!(!settings.allow_gpu);
        assert_eq!(SourceSettings::default().acquire_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_gpu_path_used_after_init() {
        let (src, counters) = source(FakeBackend::new(&[]));
        assert_eq!(src.strategy_kind(), None);

        let frame = src.capture_full().unwrap();
        assert_eq!(frame.strategy, StrategyKind::Duplication);
        assert_eq!(frame.pixels.rgba_at(0, 0), GPU_COLOR);
        assert_eq!(frame.region, primary());

        src.capture_full().unwrap();
        assert_eq!(counters.device_opens.load(Ordering::SeqCst), 1);
        assert_eq!(counters.blits.load(Ordering::SeqCst), 0);
        assert_eq!(src.strategy_kind(), Some(StrategyKind::Duplication));
    }

    #[test]
    fn test_timeout_falls_back_for_one_call() {
        let (src, counters) = source(FakeBackend::new(&[Step::Timeout, Step::Frame]));

        let first = src.capture_full().unwrap();
        assert_eq!(first.strategy, StrategyKind::Software);
        assert_eq!(first.pixels.rgba_at(0, 0), SOFT_COLOR);

        let second = src.capture_full().unwrap();
        assert_eq!(second.strategy, StrategyKind::Duplication);
        assert_eq!(counters.blits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_access_lost_recreates_duplication_not_device() {
        let (src, counters) = source(FakeBackend::new(&[Step::AccessLost]));

        let first = src.capture_full().unwrap();
        assert_eq!(first.strategy, StrategyKind::Software);
        assert_eq!(counters.recreates.load(Ordering::SeqCst), 1);

        let second = src.capture_full().unwrap();
        assert_eq!(second.strategy, StrategyKind::Duplication);
        assert_eq!(counters.recreates.load(Ordering::SeqCst), 1);
        assert_eq!(counters.device_opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_access_lost_on_release_recreates_before_next_acquire() {
        let (src, counters) = source(FakeBackend::new(&[Step::FrameThenLost]));

        // The frame read before the release failed is still served
        let first = src.capture_full().unwrap();
        assert_eq!(first.strategy, StrategyKind::Duplication);
        assert_eq!(first.pixels.rgba_at(0, 0), GPU_COLOR);
        assert_eq!(counters.recreates.load(Ordering::SeqCst), 0);

        let second = src.capture_full().unwrap();
        assert_eq!(second.strategy, StrategyKind::Duplication);
        assert_eq!(counters.recreates.load(Ordering::SeqCst), 1);
        assert_eq!(counters.acquires.load(Ordering::SeqCst), 2);
        assert_eq!(counters.device_opens.load(Ordering::SeqCst), 1);
        assert_eq!(counters.blits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_recreation_is_retried_next_call() {
        let mut backend = FakeBackend::new(&[Step::AccessLost]);
        backend.recreate_failures = 2;
        let (src, counters) = source(backend);

        // Lost, recreation fails
        assert_eq!(src.capture_full().unwrap().strategy, StrategyKind::Software);
        // Slot empty, retry fails again without acquiring
        assert_eq!(src.capture_full().unwrap().strategy, StrategyKind::Software);
        assert_eq!(counters.acquires.load(Ordering::SeqCst), 1);
        // Retry succeeds
        assert_eq!(src.capture_full().unwrap().strategy, StrategyKind::Duplication);
        assert_eq!(counters.recreates.load(Ordering::SeqCst), 3);
        assert_eq!(counters.device_opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remote_session_never_initializes_gpu() {
        let mut backend = FakeBackend::new(&[]);
        backend.remote = true;
        let (src, counters) = source(backend);

        assert_eq!(src.capture_full().unwrap().strategy, StrategyKind::Software);
        assert_eq!(counters.device_opens.load(Ordering::SeqCst), 0);
        assert_eq!(src.strategy_kind(), Some(StrategyKind::Software));
    }

    #[test]
    fn test_init_failure_pins_software() {
        let mut backend = FakeBackend::new(&[]);
        backend.init_fails = true;
        let (src, counters) = source(backend);

        for _ in 0..3 {
            assert_eq!(src.capture_full().unwrap().strategy, StrategyKind::Software);
        }
        assert_eq!(counters.device_opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_gpu_uses_software() {
        let backend = FakeBackend::new(&[]);
        let counters = Arc::clone(&backend.counters);
        let settings = SourceSettings {
            allow_gpu: false,
            ..SourceSettings::default()
        };
        let src = FrameSource::new(backend, settings);

        assert_eq!(src.capture_full().unwrap().strategy, StrategyKind::Software);
        assert_eq!(counters.device_opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_region_inside_output_is_cropped_from_gpu_frame() {
        let (src, _) = source(FakeBackend::new(&[]));
        let region = CaptureRegion::new(10, 5, 20, 10).unwrap();

        let frame = src.capture_region(region).unwrap();
        assert_eq!(frame.strategy, StrategyKind::Duplication);
        assert_eq!(frame.pixels.dimensions(), (20, 10));
        assert_eq!(frame.region, region);
    }

    #[test]
    fn test_region_outside_output_uses_software() {
        let (src, counters) = source(FakeBackend::new(&[]));
        let region = CaptureRegion::new(-100, 0, 200, 10).unwrap();

        let frame = src.capture_region(region).unwrap();
        assert_eq!(frame.strategy, StrategyKind::Software);
        assert_eq!(frame.pixels.dimensions(), (200, 10));
        assert_eq!(counters.acquires.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_hard_gpu_error_falls_back() {
        let (src, _) = source(FakeBackend::new(&[Step::Fail]));
        assert_eq!(src.capture_full().unwrap().strategy, StrategyKind::Software);
    }

    #[test]
    fn test_total_failure_is_capture_failed() {
        let mut backend = FakeBackend::new(&[Step::Timeout]);
        backend.blit_fails = true;
        let (src, _) = source(backend);

        let err = src.capture_full().unwrap_err();
        assert!(matches!(err, DeskshotError::CaptureFailed(_)), "{:?}", err);
    }
}
