//! Pointer overlay for captured frames.
//!
//! Desktop capture APIs return the desktop without the pointer, so the cursor
//! bitmap is queried separately and blended in afterwards.

use image::RgbaImage;

use crate::capture::buffer::{BYTES_PER_PIXEL, PixelBuffer};
use crate::error::Result;

/// The pointer as it looked at query time.
#[derive(Clone, Debug)]
pub struct CursorSnapshot {
    /// Pointer position in virtual-desktop pixels
    pub x: i32,
    pub y: i32,
    /// Offset of the click point inside `image`
    pub hotspot_x: i32,
    pub hotspot_y: i32,
    /// Straight (non-premultiplied) RGBA cursor bitmap
    pub image: RgbaImage,
}

impl CursorSnapshot {
    /// Top-left of the cursor bitmap in virtual-desktop pixels.
    pub fn draw_origin(&self) -> (i32, i32) {
        (self.x - self.hotspot_x, self.y - self.hotspot_y)
    }
}

/// Source of the current pointer image. Returns `None` when the cursor is
/// hidden.
pub trait CursorProvider: Send + Sync {
    fn current(&self) -> Result<Option<CursorSnapshot>>;
}

/// Provider for platforms without cursor support.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCursor;

impl CursorProvider for NoCursor {
    fn current(&self) -> Result<Option<CursorSnapshot>> {
        Ok(None)
    }
}

fn blend_channel(src: u8, dst: u8, alpha: u32) -> u8 {
    ((src as u32 * alpha + dst as u32 * (255 - alpha) + 127) / 255) as u8
}

/// Blends `cursor` into `buffer`, where `buffer` covers the desktop starting
/// at `region_offset`. Returns false without touching the buffer when the
/// cursor lies entirely outside it; partially visible cursors are clipped.
pub fn composite(
    buffer: &mut PixelBuffer,
    region_offset: (i32, i32),
    cursor: &CursorSnapshot,
) -> bool {
    let (origin_x, origin_y) = cursor.draw_origin();
    let left = origin_x as i64 - region_offset.0 as i64;
    let top = origin_y as i64 - region_offset.1 as i64;
    let (cw, ch) = cursor.image.dimensions();

    let x0 = left.max(0);
    let y0 = top.max(0);
    let x1 = (left + cw as i64).min(buffer.width() as i64);
    let y1 = (top + ch as i64).min(buffer.height() as i64);
    if x0 >= x1 || y0 >= y1 {
        return false;
    }

    let format = buffer.format();
    for y in y0..y1 {
        let row = buffer.row_mut(y as u32);
        let cy = (y - top) as u32;
        for x in x0..x1 {
            let cx = (x - left) as u32;
            let src = cursor.image.get_pixel(cx, cy).0;
            let alpha = src[3] as u32;
            if alpha == 0 {
                continue;
            }

            let i = x as usize * BYTES_PER_PIXEL;
            let dst = format.to_rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
            let out = [
                blend_channel(src[0], dst[0], alpha),
                blend_channel(src[1], dst[1], alpha),
                blend_channel(src[2], dst[2], alpha),
                (alpha + dst[3] as u32 * (255 - alpha) / 255).min(255) as u8,
            ];
            row[i..i + BYTES_PER_PIXEL].copy_from_slice(&format.from_rgba(out));
        }
    }
    true
}
