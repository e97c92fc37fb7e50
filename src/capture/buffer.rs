//! Raw 4-byte-per-pixel frame storage shared by every component.

use image::{Rgba, RgbaImage};

use crate::error::{DeskshotError, Result};

pub const BYTES_PER_PIXEL: usize = 4;

/// Channel order of the four bytes of each pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Native desktop surface order (DXGI_FORMAT_B8G8R8A8_UNORM, 32-bit DIB)
    Bgra8,
    /// Order produced by image decoders
    Rgba8,
}

impl PixelFormat {
    /// Converts one pixel in this format to RGBA.
    #[inline]
    pub fn to_rgba(self, px: [u8; 4]) -> [u8; 4] {
        match self {
            Self::Bgra8 => [px[2], px[1], px[0], px[3]],
            Self::Rgba8 => px,
        }
    }

    /// Converts one RGBA pixel into this format.
    #[inline]
    pub fn from_rgba(self, px: [u8; 4]) -> [u8; 4] {
        // The swizzle is its own inverse.
        self.to_rgba(px)
    }
}

/// A rectangular grid of pixels with an explicit row stride.
///
/// Invariants: `width > 0`, `height > 0`, `stride >= width * 4` and
/// `data.len() == stride * height`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

/// Copies `height` rows of `row_bytes` each between two pitched surfaces.
///
/// Hardware surfaces may pad each row, so a single bulk copy is only valid
/// when both pitches match.
pub(crate) fn copy_rows(
    src: &[u8],
    src_pitch: usize,
    dst: &mut [u8],
    dst_pitch: usize,
    row_bytes: usize,
    height: usize,
) {
    if height == 0 || row_bytes == 0 {
        return;
    }
    if src_pitch == dst_pitch {
        let len = src_pitch * (height - 1) + row_bytes;
        dst[..len].copy_from_slice(&src[..len]);
        return;
    }
    for y in 0..height {
        let s = y * src_pitch;
        let d = y * dst_pitch;
        dst[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
    }
}

fn checked_tight_stride(width: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(BYTES_PER_PIXEL)
        .ok_or_else(|| DeskshotError::invalid_argument("frame width overflows"))
}

impl PixelBuffer {
    /// Wraps existing bytes after validating the layout invariants.
    pub fn from_raw(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DeskshotError::invalid_argument(format!(
                "pixel buffer must be non-empty, got {}x{}",
                width, height
            )));
        }
        let min_stride = checked_tight_stride(width)?;
        if stride < min_stride {
            return Err(DeskshotError::invalid_argument(format!(
                "stride {} is smaller than width {} * 4",
                stride, width
            )));
        }
        let expected = stride
            .checked_mul(height as usize)
            .ok_or_else(|| DeskshotError::invalid_argument("frame size overflows"))?;
        if data.len() != expected {
            return Err(DeskshotError::invalid_argument(format!(
                "buffer length {} does not match stride {} * height {}",
                data.len(),
                stride,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
        })
    }

    /// Copies a pitched surface (e.g. a mapped staging texture) into a tightly
    /// packed buffer.
    pub fn from_pitched(
        src: &[u8],
        src_pitch: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DeskshotError::invalid_argument(format!(
                "pixel buffer must be non-empty, got {}x{}",
                width, height
            )));
        }
        let row_bytes = checked_tight_stride(width)?;
        if src_pitch < row_bytes {
            return Err(DeskshotError::invalid_argument(format!(
                "source pitch {} is smaller than row size {}",
                src_pitch, row_bytes
            )));
        }
        let needed = src_pitch * (height as usize - 1) + row_bytes;
        if src.len() < needed {
            return Err(DeskshotError::invalid_argument(format!(
                "source holds {} bytes, {} required",
                src.len(),
                needed
            )));
        }

        let mut data = vec![0u8; row_bytes * height as usize];
        copy_rows(src, src_pitch, &mut data, row_bytes, row_bytes, height as usize);
        Self::from_raw(width, height, row_bytes, format, data)
    }

    /// Builds a buffer from a decoded RGBA image.
    pub fn from_rgba_image(img: RgbaImage) -> Result<Self> {
        let (width, height) = img.dimensions();
        let stride = checked_tight_stride(width)?;
        Self::from_raw(width, height, stride, PixelFormat::Rgba8, img.into_raw())
    }

    /// A buffer filled with a single RGBA color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], format: PixelFormat) -> Result<Self> {
        let stride = checked_tight_stride(width)?;
        let px = format.from_rgba(rgba);
        let data = px
            .iter()
            .copied()
            .cycle()
            .take(stride * height as usize)
            .collect();
        Self::from_raw(width, height, stride, format, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The `width * 4` meaningful bytes of row `y` (padding excluded).
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * BYTES_PER_PIXEL]
    }

    pub(crate) fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.width as usize * BYTES_PER_PIXEL;
        &mut self.data[start..start + len]
    }

    /// Pixel at `(x, y)` converted to RGBA.
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let i = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        self.format
            .to_rgba([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }

    /// Copies out a sub-rectangle. The rectangle must lie inside the buffer.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<PixelBuffer> {
        if width == 0 || height == 0 {
            return Err(DeskshotError::invalid_argument(format!(
                "crop size must be positive, got {}x{}",
                width, height
            )));
        }
        let fits_x = x.checked_add(width).is_some_and(|r| r <= self.width);
        let fits_y = y.checked_add(height).is_some_and(|b| b <= self.height);
        if !fits_x || !fits_y {
            return Err(DeskshotError::invalid_argument(format!(
                "crop {}x{} at ({}, {}) exceeds {}x{} buffer",
                width, height, x, y, self.width, self.height
            )));
        }
        if x == 0 && y == 0 && width == self.width && height == self.height {
            return Ok(self.clone());
        }

        let offset = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        Self::from_pitched(
            &self.data[offset..],
            self.stride,
            width,
            height,
            self.format,
        )
    }

    /// Converts to an `image` RGBA buffer (drops row padding, swizzles BGRA).
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut img = RgbaImage::new(self.width, self.height);
        for y in 0..self.height {
            let row = self.row(y);
            for (x, px) in row.chunks_exact(BYTES_PER_PIXEL).enumerate() {
                let rgba = self.format.to_rgba([px[0], px[1], px[2], px[3]]);
                img.put_pixel(x as u32, y, Rgba(rgba));
            }
        }
        img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded_bgra(width: u32, height: u32, pitch: usize) -> Vec<u8> {
        let mut src = vec![0xEE; pitch * height as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                let i = y * pitch + x * 4;
                src[i] = x as u8; // B
                src[i + 1] = y as u8; // G
                src[i + 2] = 200; // R
                src[i + 3] = 255;
            }
        }
        src
    }

    #[test]
    fn test_from_pitched_strips_row_padding() {
        let src = padded_bgra(3, 2, 16);
        let buf = PixelBuffer::from_pitched(&src, 16, 3, 2, PixelFormat::Bgra8).unwrap();

        assert_eq!(buf.stride(), 12);
        assert_eq!(buf.as_bytes().len(), 24);
        assert!(!buf.as_bytes().contains(&0xEE), "padding bytes leaked");
        assert_eq!(buf.rgba_at(2, 1), [200, 1, 2, 255]);
    }

    #[test]
    fn test_from_pitched_fast_path_matches_row_copy() {
        let tight = padded_bgra(4, 3, 16);
        let padded = padded_bgra(4, 3, 20);
        let a = PixelBuffer::from_pitched(&tight, 16, 4, 3, PixelFormat::Bgra8).unwrap();
        let b = PixelBuffer::from_pitched(&padded, 20, 4, 3, PixelFormat::Bgra8).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_from_pitched_rejects_short_source() {
        let src = vec![0u8; 10];
        assert!(PixelBuffer::from_pitched(&src, 16, 3, 2, PixelFormat::Bgra8).is_err());
        assert!(PixelBuffer::from_pitched(&src, 8, 3, 1, PixelFormat::Bgra8).is_err());
    }

    #[test]
    fn test_from_raw_validates_layout() {
        assert!(PixelBuffer::from_raw(2, 2, 8, PixelFormat::Rgba8, vec![0; 16]).is_ok());
        assert!(PixelBuffer::from_raw(2, 2, 12, PixelFormat::Rgba8, vec![0; 24]).is_ok());
        assert!(PixelBuffer::from_raw(2, 2, 6, PixelFormat::Rgba8, vec![0; 12]).is_err());
        assert!(PixelBuffer::from_raw(2, 2, 8, PixelFormat::Rgba8, vec![0; 15]).is_err());
        assert!(PixelBuffer::from_raw(0, 2, 8, PixelFormat::Rgba8, vec![]).is_err());
    }

    #[test]
    fn test_crop() {
        let src = padded_bgra(10, 8, 48);
        let buf = PixelBuffer::from_pitched(&src, 48, 10, 8, PixelFormat::Bgra8).unwrap();

        let cropped = buf.crop(3, 2, 4, 5).unwrap();
        assert_eq!(cropped.dimensions(), (4, 5));
        assert_eq!(cropped.rgba_at(0, 0), [200, 2, 3, 255]);
        assert_eq!(cropped.rgba_at(3, 4), [200, 6, 6, 255]);

        assert!(buf.crop(8, 0, 3, 1).is_err());
        assert!(buf.crop(0, 0, 0, 1).is_err());
        assert!(buf.crop(u32::MAX, 0, 2, 1).is_err());
    }

    #[test]
    fn test_rgba_image_conversion_swizzles() {
        let buf = PixelBuffer::solid(2, 2, [10, 20, 30, 255], PixelFormat::Bgra8).unwrap();
        assert_eq!(&buf.as_bytes()[..4], &[30, 20, 10, 255]);

        let img = buf.to_rgba_image();
        assert_eq!(img.get_pixel(1, 1).0, [10, 20, 30, 255]);

        let back = PixelBuffer::from_rgba_image(img).unwrap();
        assert_eq!(back.format(), PixelFormat::Rgba8);
        assert_eq!(back.rgba_at(0, 1), [10, 20, 30, 255]);
    }
}
