//! Software capture through a GDI block transfer.

use anyhow::{Context, anyhow};
use std::ffi::c_void;
use std::mem::size_of;
use std::ptr::null_mut;

use windows::Win32::Foundation::{HANDLE, HWND};
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CAPTUREBLT, CreateCompatibleDC,
    CreateDIBSection, DIB_RGB_COLORS, DeleteDC, DeleteObject, GdiFlush, GetDC, HBITMAP, HDC,
    HGDIOBJ, ReleaseDC, SRCCOPY, SelectObject,
};

use crate::capture::buffer::{PixelBuffer, PixelFormat};
use crate::capture::region::CaptureRegion;

/// Screen DC, memory DC and a top-down 32-bit DIB section, released on drop.
struct BlitTarget {
    screen_dc: HDC,
    mem_dc: HDC,
    bitmap: HBITMAP,
    old_bitmap: HGDIOBJ,
    bits: *const u8,
}

impl BlitTarget {
    fn new(width: i32, height: i32) -> anyhow::Result<Self> {
        let screen_dc = unsafe { GetDC(HWND::default()) };
        if screen_dc.is_invalid() {
            return Err(anyhow!("GetDC(NULL) returned null"));
        }

        let mem_dc = unsafe { CreateCompatibleDC(screen_dc) };
        if mem_dc.is_invalid() {
            unsafe {
                let _ = ReleaseDC(HWND::default(), screen_dc);
            }
            return Err(anyhow!("CreateCompatibleDC failed"));
        }

        let mut info = BITMAPINFO::default();
        info.bmiHeader.biSize = size_of::<BITMAPINFOHEADER>() as u32;
        info.bmiHeader.biWidth = width;
        // Negative height selects a top-down DIB.
        info.bmiHeader.biHeight = -height;
        info.bmiHeader.biPlanes = 1;
        info.bmiHeader.biBitCount = 32;
        info.bmiHeader.biCompression = BI_RGB.0;

        let mut bits: *mut c_void = null_mut();
        let bitmap = match unsafe {
            CreateDIBSection(mem_dc, &info, DIB_RGB_COLORS, &mut bits, HANDLE::default(), 0)
        } {
            Ok(bitmap) => bitmap,
            Err(e) => {
                unsafe {
                    let _ = DeleteDC(mem_dc);
                    let _ = ReleaseDC(HWND::default(), screen_dc);
                }
                return Err(anyhow::Error::from(e).context("CreateDIBSection failed"));
            }
        };

        let old_bitmap = unsafe { SelectObject(mem_dc, bitmap) };
        Ok(Self {
            screen_dc,
            mem_dc,
            bitmap,
            old_bitmap,
            bits: bits as *const u8,
        })
    }
}

impl Drop for BlitTarget {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.mem_dc, self.old_bitmap);
            let _ = DeleteObject(self.bitmap);
            let _ = DeleteDC(self.mem_dc);
            let _ = ReleaseDC(HWND::default(), self.screen_dc);
        }
    }
}

/// Copies `region` of the virtual desktop into a new buffer. Screen DC
/// coordinates match virtual-desktop pixels, including negative origins.
pub fn blit_region(region: &CaptureRegion) -> anyhow::Result<PixelBuffer> {
    let width = i32::try_from(region.width).context("region width overflows i32")?;
    let height = i32::try_from(region.height).context("region height overflows i32")?;
    let target = BlitTarget::new(width, height)?;

    unsafe {
        BitBlt(
            target.mem_dc,
            0,
            0,
            width,
            height,
            target.screen_dc,
            region.x,
            region.y,
            SRCCOPY | CAPTUREBLT,
        )
    }
    .context("BitBlt failed")?;
    unsafe {
        let _ = GdiFlush();
    }

    let stride = region.width as usize * 4;
    let bits = unsafe { std::slice::from_raw_parts(target.bits, stride * region.height as usize) };
    let mut pixels =
        PixelBuffer::from_pitched(bits, stride, region.width, region.height, PixelFormat::Bgra8)
            .map_err(|e| anyhow!("copying DIB section failed: {}", e))?;

    // 32-bit DIBs leave alpha undefined; desktop pixels are opaque.
    for y in 0..pixels.height() {
        for px in pixels.row_mut(y).chunks_exact_mut(4) {
            px[3] = 255;
        }
    }
    Ok(pixels)
}
