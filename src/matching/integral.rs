//! Summed-area tables for O(1) window statistics.

use super::luma::LumaPlane;

/// Sum and sum-of-squares tables with a zero top row and left column, so a
/// window's totals need no edge cases.
pub struct IntegralImage {
    stride: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl IntegralImage {
    pub fn new(plane: &LumaPlane) -> Self {
        let (w, h) = (plane.width(), plane.height());
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq_sum = vec![0.0; stride * (h + 1)];

        for y in 0..h {
            let row = plane.row(y);
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = row[x];
                row_sum += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row_sum;
                sq_sum[i] = sq_sum[i - stride] + row_sq;
            }
        }

        Self {
            stride,
            sum,
            sq_sum,
        }
    }

    #[inline]
    fn rect(table: &[f64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let top = y * stride;
        let bottom = (y + h) * stride;
        table[bottom + x + w] - table[top + x + w] - table[bottom + x] + table[top + x]
    }

    /// `(sum, sum_of_squares)` of the `w`x`h` window at `(x, y)`.
    #[inline]
    pub fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        (
            Self::rect(&self.sum, self.stride, x, y, w, h),
            Self::rect(&self.sq_sum, self.stride, x, y, w, h),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_window_matches_brute_force() {
        let img = RgbaImage::from_fn(7, 5, |x, y| {
            let v = ((x * 31 + y * 17) % 251) as u8;
            Rgba([v, v, v, 255])
        });
        let plane = LumaPlane::from_rgba_image(&img);
        let table = IntegralImage::new(&plane);

        for (x, y, w, h) in [(0, 0, 7, 5), (2, 1, 3, 3), (6, 4, 1, 1), (0, 3, 7, 2)] {
            let mut sum = 0.0;
            let mut sq = 0.0;
            for yy in y..y + h {
                for &v in &plane.row(yy)[x..x + w] {
                    sum += v;
                    sq += v * v;
                }
            }
            let (s, q) = table.window(x, y, w, h);
            assert!((s - sum).abs() < 1e-6, "sum at {:?}", (x, y, w, h));
            assert!((q - sq).abs() < 1e-3, "sq at {:?}", (x, y, w, h));
        }
    }
}
