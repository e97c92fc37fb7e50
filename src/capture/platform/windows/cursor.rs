//! Current pointer bitmap via `GetCursorInfo` / `GetIconInfo`.

use anyhow::{Context, anyhow};
use image::{Rgba, RgbaImage};
use std::mem::size_of;

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAP, BITMAPINFO, BITMAPINFOHEADER, DIB_RGB_COLORS, DeleteObject, GetDC, GetDIBits,
    GetObjectW, HBITMAP, HDC, ReleaseDC,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CURSOR_SHOWING, CURSORINFO, GetCursorInfo, GetIconInfo, HICON, ICONINFO,
};

use crate::capture::cursor::{CursorProvider, CursorSnapshot};
use crate::error::{DeskshotError, Result};

fn bitmap_size(bitmap: HBITMAP) -> anyhow::Result<(i32, i32)> {
    let mut bm = BITMAP::default();
    let written = unsafe {
        GetObjectW(
            bitmap,
            size_of::<BITMAP>() as i32,
            Some(&mut bm as *mut BITMAP as *mut _),
        )
    };
    if written == 0 {
        return Err(anyhow!("GetObjectW failed for cursor bitmap"));
    }
    Ok((bm.bmWidth, bm.bmHeight))
}

/// Reads a bitmap as top-down 32-bit BGRA rows.
fn read_bits(dc: HDC, bitmap: HBITMAP, width: i32, height: i32) -> anyhow::Result<Vec<u8>> {
    let mut info = BITMAPINFO::default();
    info.bmiHeader.biSize = size_of::<BITMAPINFOHEADER>() as u32;
    info.bmiHeader.biWidth = width;
    info.bmiHeader.biHeight = -height;
    info.bmiHeader.biPlanes = 1;
    info.bmiHeader.biBitCount = 32;
    info.bmiHeader.biCompression = BI_RGB.0;

    let mut bits = vec![0u8; width as usize * height as usize * 4];
    let lines = unsafe {
        GetDIBits(
            dc,
            bitmap,
            0,
            height as u32,
            Some(bits.as_mut_ptr().cast()),
            &mut info,
            DIB_RGB_COLORS,
        )
    };
    if lines == 0 {
        return Err(anyhow!("GetDIBits failed for cursor bitmap"));
    }
    Ok(bits)
}

/// Color cursor: BGRA bits, with alpha taken from the AND mask when the
/// bitmap carries none.
fn decode_color(color: &[u8], mask: Option<&[u8]>, width: u32, height: u32) -> RgbaImage {
    let has_alpha = color.chunks_exact(4).any(|px| px[3] != 0);
    RgbaImage::from_fn(width, height, |x, y| {
        let i = (y * width + x) as usize * 4;
        let alpha = if has_alpha {
            color[i + 3]
        } else {
            match mask {
                Some(mask) if mask[i] != 0 => 0,
                _ => 255,
            }
        };
        Rgba([color[i + 2], color[i + 1], color[i], alpha])
    })
}

/// Monochrome cursor: the mask bitmap holds the AND mask on top of the XOR
/// mask. Inverted pixels are drawn black.
fn decode_monochrome(mask: &[u8], width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let and_bit = mask[(y * width + x) as usize * 4] != 0;
        let xor_bit = mask[((y + height) * width + x) as usize * 4] != 0;
        match (and_bit, xor_bit) {
            (false, false) => Rgba([0, 0, 0, 255]),
            (false, true) => Rgba([255, 255, 255, 255]),
            (true, false) => Rgba([0, 0, 0, 0]),
            (true, true) => Rgba([0, 0, 0, 255]),
        }
    })
}

fn snapshot_icon(icon: HICON, x: i32, y: i32) -> anyhow::Result<CursorSnapshot> {
    let mut icon_info = ICONINFO::default();
    unsafe { GetIconInfo(icon, &mut icon_info) }.context("GetIconInfo failed")?;

    let dc = unsafe { GetDC(HWND::default()) };
    let result = (|| -> anyhow::Result<CursorSnapshot> {
        let (mask_w, mask_h) = bitmap_size(icon_info.hbmMask)?;
        let mask = read_bits(dc, icon_info.hbmMask, mask_w, mask_h)?;

        let image = if icon_info.hbmColor.is_invalid() {
            decode_monochrome(&mask, mask_w as u32, (mask_h / 2) as u32)
        } else {
            let (w, h) = bitmap_size(icon_info.hbmColor)?;
            let color = read_bits(dc, icon_info.hbmColor, w, h)?;
            let mask = (mask_w == w && mask_h == h).then_some(mask.as_slice());
            decode_color(&color, mask, w as u32, h as u32)
        };

        Ok(CursorSnapshot {
            x,
            y,
            hotspot_x: icon_info.xHotspot as i32,
            hotspot_y: icon_info.yHotspot as i32,
            image,
        })
    })();

    unsafe {
        let _ = ReleaseDC(HWND::default(), dc);
        if !icon_info.hbmColor.is_invalid() {
            let _ = DeleteObject(icon_info.hbmColor);
        }
        if !icon_info.hbmMask.is_invalid() {
            let _ = DeleteObject(icon_info.hbmMask);
        }
    }
    result
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WindowsCursor;

impl CursorProvider for WindowsCursor {
    fn current(&self) -> Result<Option<CursorSnapshot>> {
        let mut info = CURSORINFO {
            cbSize: size_of::<CURSORINFO>() as u32,
            ..Default::default()
        };
        unsafe { GetCursorInfo(&mut info) }
            .context("GetCursorInfo failed")
            .map_err(DeskshotError::Platform)?;

        if info.flags.0 & CURSOR_SHOWING.0 == 0 || info.hCursor.is_invalid() {
            return Ok(None);
        }

        let snapshot = snapshot_icon(HICON(info.hCursor.0), info.ptScreenPos.x, info.ptScreenPos.y)
            .map_err(DeskshotError::Platform)?;
        Ok(Some(snapshot))
    }
}
