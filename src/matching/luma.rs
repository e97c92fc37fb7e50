//! Grayscale planes for correlation.

use image::RgbaImage;

use crate::capture::buffer::{BYTES_PER_PIXEL, PixelBuffer};

/// ITU-R BT.601 luma: Y = 0.299*R + 0.587*G + 0.114*B, in 0.0-255.0.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

/// Row-major luminance values.
#[derive(Clone, Debug, PartialEq)]
pub struct LumaPlane {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl LumaPlane {
    pub fn from_buffer(buffer: &PixelBuffer) -> Self {
        let (width, height) = (buffer.width() as usize, buffer.height() as usize);
        let format = buffer.format();
        let mut data = Vec::with_capacity(width * height);
        for y in 0..buffer.height() {
            for px in buffer.row(y).chunks_exact(BYTES_PER_PIXEL) {
                let [r, g, b, _] = format.to_rgba([px[0], px[1], px[2], px[3]]);
                data.push(luminance(r, g, b));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_rgba_image(img: &RgbaImage) -> Self {
        let data = img
            .pixels()
            .map(|p| luminance(p[0], p[1], p[2]))
            .collect();
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[f64] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::buffer::PixelFormat;

    #[test]
    fn test_luminance_weights() {
        assert!((luminance(255, 255, 255) - 255.0).abs() < 1e-9);
        assert!((luminance(255, 0, 0) - 76.245).abs() < 1e-9);
        assert!((luminance(0, 255, 0) - 149.685).abs() < 1e-9);
        assert!((luminance(0, 0, 255) - 29.07).abs() < 1e-9);
    }

    #[test]
    fn test_bgra_and_rgba_agree() {
        let bgra = PixelBuffer::solid(3, 2, [200, 100, 50, 255], PixelFormat::Bgra8).unwrap();
        let rgba = PixelBuffer::solid(3, 2, [200, 100, 50, 255], PixelFormat::Rgba8).unwrap();
        let a = LumaPlane::from_buffer(&bgra);
        let b = LumaPlane::from_buffer(&rgba);
        assert_eq!(a, b);
        assert_eq!(a, LumaPlane::from_rgba_image(&bgra.to_rgba_image()));
        assert_eq!((a.width(), a.height(), a.len()), (3, 2, 6));
    }
}
