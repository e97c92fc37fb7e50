//! Capture request options and the encoded screenshot value.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::capture::buffer::PixelBuffer;
use crate::capture::region::CaptureRegion;
use crate::capture::source::StrategyKind;
use crate::codec::{EncodingKind, ImageFormat};
use crate::config::CaptureConfig;
use crate::error::{DeskshotError, Result};
use crate::matching::{self, MatchResult};

/// How a captured frame is post-processed before it is returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureOptions {
    pub format: EncodingKind,
    /// JPEG quality, 1-100. Ignored for lossless output.
    pub quality: u8,
    /// Exact output width; `None` keeps the native width (or follows the
    /// aspect ratio when only the height is set).
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    /// Bounding box applied when no explicit target is set. Aspect ratio is
    /// preserved and frames are never upscaled.
    pub max_size: Option<(u32, u32)>,
    pub include_cursor: bool,
}

impl CaptureOptions {
    /// Full-screen defaults: bounded size, lossy encoding.
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            format: config.format,
            quality: config.quality,
            target_width: None,
            target_height: None,
            max_size: Some((config.max_width, config.max_height)),
            include_cursor: config.include_cursor,
        }
    }

    /// Region and window defaults: no resize, so pixel coordinates in the
    /// result stay valid for matching and clicking.
    pub fn region_default() -> Self {
        let config = &crate::config::get_config().capture;
        Self {
            format: EncodingKind::Lossless,
            max_size: None,
            ..Self::from_config(config)
        }
    }

    /// Native size, lossless, no cursor overlay.
    pub fn pixel_exact() -> Self {
        Self {
            format: EncodingKind::Lossless,
            quality: 100,
            target_width: None,
            target_height: None,
            max_size: None,
            include_cursor: false,
        }
    }

    pub fn lossy(mut self) -> Self {
        self.format = EncodingKind::Lossy;
        self
    }

    pub fn lossless(mut self) -> Self {
        self.format = EncodingKind::Lossless;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_target(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.target_width = width;
        self.target_height = height;
        self
    }

    pub fn with_cursor(mut self, include_cursor: bool) -> Self {
        self.include_cursor = include_cursor;
        self
    }

    /// Rejects out-of-range quality and zero resize targets before any
    /// capture work happens.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(DeskshotError::invalid_argument(format!(
                "quality must be within 1-100, got {}",
                self.quality
            )));
        }
        if self.target_width == Some(0) || self.target_height == Some(0) {
            return Err(DeskshotError::invalid_argument(format!(
                "resize target must be positive, got {:?}x{:?}",
                self.target_width, self.target_height
            )));
        }
        let limit = crate::codec::MAX_TARGET_DIMENSION;
        if self.target_width.is_some_and(|w| w > limit)
            || self.target_height.is_some_and(|h| h > limit)
        {
            return Err(DeskshotError::invalid_argument(format!(
                "resize target {:?}x{:?} exceeds the {}px limit",
                self.target_width, self.target_height, limit
            )));
        }
        Ok(())
    }

    /// Options with `max_size` folded into an explicit target for a frame of
    /// the given native size.
    pub(crate) fn resolved_for(&self, native: (u32, u32)) -> CaptureOptions {
        let mut resolved = self.clone();
        if resolved.target_width.is_none() && resolved.target_height.is_none() {
            if let Some((max_w, max_h)) = resolved.max_size {
                let (w, h) = crate::codec::fit_within(native.0, native.1, max_w, max_h);
                if (w, h) != native {
                    resolved.target_width = Some(w);
                    resolved.target_height = Some(h);
                }
            }
        }
        resolved.max_size = None;
        resolved
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from_config(&crate::config::get_config().capture)
    }
}

/// An encoded capture result.
#[derive(Clone, Debug)]
pub struct Screenshot {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    /// Final size after any resize
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Local>,
    /// Virtual-desktop rectangle the pixels were taken from
    pub origin: CaptureRegion,
    /// Which capture path produced the frame
    pub strategy: StrategyKind,
}

impl Screenshot {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` for vision-model requests.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.to_base64())
    }

    /// Writes the encoded bytes to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }

    /// Writes into `dir` under a timestamped file name and returns the path.
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(crate::paths::screenshot_file_name(
            &self.captured_at,
            self.format,
        ));
        self.save(&path)?;
        tracing::info!("Saved to {}", path.display());
        Ok(path)
    }

    /// Decodes the payload back into pixels.
    pub fn decode(&self) -> Result<PixelBuffer> {
        let img = image::load_from_memory(&self.bytes)
            .map_err(|e| DeskshotError::encoding(format!("failed to decode screenshot: {}", e)))?;
        PixelBuffer::from_rgba_image(img.to_rgba8())
    }

    /// Searches this screenshot for a reference image. Results are in
    /// screenshot pixel space; see [`Screenshot::to_screen`].
    pub fn find(&self, reference: &Path, threshold: f64) -> Result<Vec<MatchResult>> {
        let pixels = self.decode()?;
        matching::find(&pixels, reference, threshold)
    }

    /// Maps a point in screenshot pixels back to virtual-desktop pixels,
    /// undoing any resize applied at capture time.
    pub fn to_screen(&self, x: i32, y: i32) -> (i32, i32) {
        let sx = self.origin.width as f64 / self.width as f64;
        let sy = self.origin.height as f64 / self.height as f64;
        (
            self.origin.x + (x as f64 * sx).floor() as i32,
            self.origin.y + (y as f64 * sy).floor() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::buffer::PixelFormat;

    fn screenshot_of(buffer: &PixelBuffer, origin: CaptureRegion) -> Screenshot {
        let encoded = crate::codec::encode(buffer, &CaptureOptions::pixel_exact()).unwrap();
        Screenshot {
            bytes: encoded.bytes,
            format: encoded.format,
            width: encoded.width,
            height: encoded.height,
            captured_at: Local::now(),
            origin,
            strategy: StrategyKind::Software,
        }
    }

    #[test]
    fn test_validate_quality_range() {
        assert!(CaptureOptions::pixel_exact().with_quality(0).validate().is_err());
        assert!(CaptureOptions::pixel_exact().with_quality(101).validate().is_err());
        assert!(CaptureOptions::pixel_exact().with_quality(1).validate().is_ok());
        assert!(
            CaptureOptions::pixel_exact()
                .with_target(Some(0), None)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_oversized_target() {
        let limit = crate::codec::MAX_TARGET_DIMENSION;
        let err = CaptureOptions::pixel_exact()
            .with_target(Some(u32::MAX), Some(u32::MAX))
            .validate()
            .unwrap_err();
        assert!(matches!(err, DeskshotError::InvalidArgument(_)));
        assert!(
            CaptureOptions::pixel_exact()
                .with_target(None, Some(limit + 1))
                .validate()
                .is_err()
        );
        assert!(
            CaptureOptions::pixel_exact()
                .with_target(Some(limit), Some(limit))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_default_bounds_full_screen_captures() {
        let options = CaptureOptions::from_config(&CaptureConfig::default());
        assert_eq!(options.format, EncodingKind::Lossy);

        let resolved = options.resolved_for((2560, 1440));
        assert_eq!(resolved.target_width, Some(1024));
        assert_eq!(resolved.target_height, Some(576));

        let small = options.resolved_for((800, 600));
        assert_eq!(small.target_width, None);
    }

    #[test]
    fn test_region_default_does_not_resize() {
        let options = CaptureOptions::region_default();
        let resolved = options.resolved_for((4000, 3000));
        assert_eq!(resolved.target_width, None);
        assert_eq!(resolved.target_height, None);
        assert_eq!(options.format, EncodingKind::Lossless);
        assert_eq!(options.max_size, None);

        // Unlike pixel_exact, the cursor follows the capture config
        let config = &crate::config::get_config().capture;
        assert_eq!(options.include_cursor, config.include_cursor);
        assert!(!CaptureOptions::pixel_exact().include_cursor);
    }

    #[test]
    fn test_explicit_target_wins_over_bounds() {
        let options = CaptureOptions::from_config(&CaptureConfig::default())
            .with_target(Some(300), None);
        let resolved = options.resolved_for((2560, 1440));
        assert_eq!(resolved.target_width, Some(300));
        assert_eq!(resolved.target_height, None);
    }

    #[test]
    fn test_data_url_and_decode() {
        let buffer = PixelBuffer::solid(4, 3, [1, 2, 3, 255], PixelFormat::Bgra8).unwrap();
        let shot = screenshot_of(&buffer, CaptureRegion::new(0, 0, 4, 3).unwrap());

        assert!(shot.to_data_url().starts_with("data:image/png;base64,iVBOR"));
        let decoded = shot.decode().unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.rgba_at(3, 2), [1, 2, 3, 255]);
    }

    #[test]
    fn test_to_screen_undoes_resize() {
        let buffer = PixelBuffer::solid(100, 50, [0, 0, 0, 255], PixelFormat::Rgba8).unwrap();
        let shot = screenshot_of(&buffer, CaptureRegion::new(-1920, 100, 200, 100).unwrap());
        assert_eq!(shot.to_screen(0, 0), (-1920, 100));
        assert_eq!(shot.to_screen(10, 5), (-1900, 110));
    }

    #[test]
    fn test_save_to_dir_uses_timestamped_name() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = PixelBuffer::solid(2, 2, [9, 9, 9, 255], PixelFormat::Rgba8).unwrap();
        let shot = screenshot_of(&buffer, CaptureRegion::new(0, 0, 2, 2).unwrap());

        let path = shot.save_to_dir(dir.path()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("deskshot_") && name.ends_with(".png"));
        assert_eq!(std::fs::read(&path).unwrap(), shot.bytes);
    }
}
