//! Resizing and compression of captured frames.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::capture::buffer::PixelBuffer;
use crate::capture::options::CaptureOptions;
use crate::error::{DeskshotError, Result};

/// Requested compression family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingKind {
    Lossless,
    Lossy,
}

/// Concrete output format. The MIME type must match the encoder exactly;
/// downstream base64 / vision-API framing relies on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn for_kind(kind: EncodingKind) -> Self {
        match kind {
            EncodingKind::Lossless => Self::Png,
            EncodingKind::Lossy => Self::Jpeg,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Compressed frame plus its final dimensions.
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Largest size with the same aspect ratio as `width`x`height` that fits in
/// `max_width`x`max_height`. Never upscales.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_width.max(1));
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_height.max(1));
    (w, h)
}

/// Largest width or height a resize may produce. Larger targets are
/// rejected before any pixels are allocated.
pub const MAX_TARGET_DIMENSION: u32 = 16_384;

fn check_target(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(DeskshotError::invalid_argument(format!(
            "resize target must be positive, got {}x{}",
            width, height
        )));
    }
    if width > MAX_TARGET_DIMENSION || height > MAX_TARGET_DIMENSION {
        return Err(DeskshotError::invalid_argument(format!(
            "resize target {}x{} exceeds the {}px limit",
            width, height, MAX_TARGET_DIMENSION
        )));
    }
    Ok(())
}

/// Resolves the requested output size against the native size.
///
/// Returns `None` when no resize is needed. A zero target on either axis is
/// rejected rather than clamped, as is any side (given or derived) above
/// [`MAX_TARGET_DIMENSION`]. When only one axis is given, the other follows
/// the native aspect ratio.
pub fn resolve_target_size(
    native: (u32, u32),
    target_width: Option<u32>,
    target_height: Option<u32>,
) -> Result<Option<(u32, u32)>> {
    if target_width == Some(0) || target_height == Some(0) {
        return Err(DeskshotError::invalid_argument(format!(
            "resize target must be positive, got {:?}x{:?}",
            target_width, target_height
        )));
    }
    let (nw, nh) = native;
    let (w, h) = match (target_width, target_height) {
        (None, None) => return Ok(None),
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, scaled_side(nh, w, nw)),
        (None, Some(h)) => (scaled_side(nw, h, nh), h),
    };
    check_target(w, h)?;
    if (w, h) == native {
        Ok(None)
    } else {
        Ok(Some((w, h)))
    }
}

// `side * target / native`, saturating at u32::MAX so the limit check sees it.
fn scaled_side(side: u32, target: u32, native: u32) -> u32 {
    let scaled = (side as f64 * target as f64 / native as f64).round().max(1.0);
    if scaled >= u32::MAX as f64 {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// Resamples a buffer to exactly `width`x`height`.
pub fn resize(buffer: &PixelBuffer, width: u32, height: u32) -> Result<RgbaImage> {
    check_target(width, height)?;
    let img = buffer.to_rgba_image();
    Ok(image::imageops::resize(&img, width, height, FilterType::Triangle))
}

fn compress(img: &RgbaImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let (width, height) = img.dimensions();
    let mut bytes = Vec::new();
    match format {
        ImageFormat::Png => PngEncoder::new(&mut bytes)
            .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
            .map_err(|e| DeskshotError::encoding(format!("PNG encoding failed: {}", e)))?,
        ImageFormat::Jpeg => {
            // JPEG carries no alpha channel.
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut bytes, quality)
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(|e| DeskshotError::encoding(format!("JPEG encoding failed: {}", e)))?
        }
    }
    Ok(bytes)
}

/// Resizes (if requested) and compresses a frame per `options`.
pub fn encode(buffer: &PixelBuffer, options: &CaptureOptions) -> Result<EncodedImage> {
    options.validate()?;

    let target = resolve_target_size(
        buffer.dimensions(),
        options.target_width,
        options.target_height,
    )?;
    let img = match target {
        Some((w, h)) => {
            tracing::debug!(
                "Resizing {}x{} -> {}x{}",
                buffer.width(),
                buffer.height(),
                w,
                h
            );
            resize(buffer, w, h)?
        }
        None => buffer.to_rgba_image(),
    };

    let format = ImageFormat::for_kind(options.format);
    let bytes = compress(&img, format, options.quality)?;
    Ok(EncodedImage {
        bytes,
        format,
        width: img.width(),
        height: img.height(),
    })
}
