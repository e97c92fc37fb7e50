//! Template matching by normalized cross-correlation.
//!
//! Both images are reduced to BT.601 luminance, so matches survive uniform
//! brightness and contrast changes. Window statistics come from integral
//! images; only the cross term is computed per pixel. Overlapping hits are
//! collapsed by non-maximum suppression and returned strongest first.
//!
//! An empty result means "not found" and is not an error. A missing or
//! undecodable reference file is.

mod cancel;
mod integral;
mod luma;
mod ncc;
mod nms;

pub use cancel::CancellationToken;
pub use luma::{LumaPlane, luminance};

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

use crate::capture::buffer::PixelBuffer;
use crate::capture::region::CaptureRegion;
use crate::config::MatchingConfig;
use crate::error::{DeskshotError, Result};
use integral::IntegralImage;
use ncc::{Reference, Search};

/// Default minimum correlation for a match.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// One occurrence of the reference image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Top-left in the searched buffer's pixel space
    pub x: i32,
    pub y: i32,
    /// Reference image size
    pub width: u32,
    pub height: u32,
    /// Raw NCC score in [-1, 1]; higher is stronger
    pub confidence: f64,
}

impl MatchResult {
    pub fn center(&self) -> (i32, i32) {
        crate::coords::center(self.x, self.y, self.width as i32, self.height as i32)
    }

    /// Confidence clamped to [0, 1] for display.
    pub fn display_confidence(&self) -> f64 {
        self.confidence.clamp(0.0, 1.0)
    }

    /// Translates a match found in a buffer captured at `origin` into
    /// virtual-desktop coordinates.
    pub fn to_screen(&self, origin: &CaptureRegion) -> MatchResult {
        MatchResult {
            x: self.x + origin.x,
            y: self.y + origin.y,
            ..*self
        }
    }
}

/// Search parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchConfig {
    /// Minimum score for a candidate
    pub threshold: f64,
    /// Suppression radius as a fraction of the reference size
    pub suppression_factor: f64,
    /// Scoped threads for the row scan; 1 scans on the calling thread
    pub workers: usize,
    /// Keep at most this many results
    pub max_results: Option<usize>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self::from_config(&MatchingConfig::default())
    }
}

impl MatchConfig {
    pub fn from_config(config: &MatchingConfig) -> Self {
        Self {
            threshold: config.threshold,
            suppression_factor: config.suppression_factor,
            workers: config.workers.max(1),
            max_results: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            return Err(DeskshotError::invalid_argument(format!(
                "threshold must be a finite number, got {}",
                self.threshold
            )));
        }
        if !self.suppression_factor.is_finite() || self.suppression_factor < 0.0 {
            return Err(DeskshotError::invalid_argument(format!(
                "suppression factor must be non-negative, got {}",
                self.suppression_factor
            )));
        }
        Ok(())
    }
}

/// Loads a reference image, distinguishing a missing file from a corrupt one.
pub fn load_reference(path: &Path) -> Result<RgbaImage> {
    if !path.is_file() {
        return Err(DeskshotError::TemplateNotFound(path.to_path_buf()));
    }
    let img = image::open(path).map_err(|source| DeskshotError::TemplateDecode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgba8())
}

/// Searches `source` for the image at `reference_path`.
///
/// Suppression and worker settings come from the global configuration.
pub fn find(source: &PixelBuffer, reference_path: &Path, threshold: f64) -> Result<Vec<MatchResult>> {
    let reference = load_reference(reference_path)?;
    let config =
        MatchConfig::from_config(&crate::config::get_config().matching).with_threshold(threshold);
    find_with(source, &reference, &config, &CancellationToken::new())
}

/// Searches `source` for an already decoded reference image.
pub fn find_with(
    source: &PixelBuffer,
    reference: &RgbaImage,
    config: &MatchConfig,
    cancel: &CancellationToken,
) -> Result<Vec<MatchResult>> {
    config.validate()?;
    cancel.check()?;

    let (ref_w, ref_h) = reference.dimensions();
    if ref_w == 0 || ref_h == 0 {
        return Err(DeskshotError::invalid_argument("reference image is empty"));
    }
    if ref_w > source.width() || ref_h > source.height() {
        tracing::debug!(
            "Reference {}x{} is larger than source {}x{}",
            ref_w,
            ref_h,
            source.width(),
            source.height()
        );
        return Ok(Vec::new());
    }

    let start = Instant::now();
    let ref_plane = LumaPlane::from_rgba_image(reference);
    let Some(reference) = Reference::new(&ref_plane) else {
        tracing::debug!("Reference image is flat, no correlation possible");
        return Ok(Vec::new());
    };

    let src_plane = LumaPlane::from_buffer(source);
    let integral = IntegralImage::new(&src_plane);
    let search = Search {
        source: &src_plane,
        integral: &integral,
        reference: &reference,
        threshold: config.threshold,
        cancel,
    };
    let candidates = search.scan(config.workers)?;
    let candidate_count = candidates.len();

    let rx = nms::suppression_radius(ref_w as usize, config.suppression_factor);
    let ry = nms::suppression_radius(ref_h as usize, config.suppression_factor);
    let mut kept = nms::suppress(candidates, rx, ry);
    if let Some(max) = config.max_results {
        kept.truncate(max);
    }

    tracing::debug!(
        "Template search {}x{} in {}x{}: {} candidate(s), {} match(es) in {:?}",
        ref_w,
        ref_h,
        source.width(),
        source.height(),
        candidate_count,
        kept.len(),
        start.elapsed()
    );

    Ok(kept
        .into_iter()
        .map(|c| MatchResult {
            x: c.x as i32,
            y: c.y as i32,
            width: ref_w,
            height: ref_h,
            confidence: c.score,
        })
        .collect())
}
