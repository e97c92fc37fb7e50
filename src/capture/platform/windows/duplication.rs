//! DXGI desktop duplication of the primary output.

use anyhow::{Context, anyhow};
use std::time::Duration;

use windows::Win32::Graphics::Direct3D::{D3D_DRIVER_TYPE_UNKNOWN, D3D_FEATURE_LEVEL_11_0};
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAP_READ,
    D3D11_MAPPED_SUBRESOURCE, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_NOT_FOUND, DXGI_ERROR_WAIT_TIMEOUT,
    DXGI_OUTDUPL_FRAME_INFO, IDXGIAdapter, IDXGIFactory1, IDXGIOutput, IDXGIOutput1,
    IDXGIOutputDuplication, IDXGIResource,
};
use windows::core::{HRESULT, Interface};

use crate::capture::buffer::{PixelBuffer, PixelFormat};
use crate::capture::region::CaptureRegion;
use crate::capture::source::{AcquireOutcome, DuplicationSession};
use crate::error::{DeskshotError, Result};

/// Finds the adapter and output that host the desktop origin.
fn find_primary_output() -> anyhow::Result<(IDXGIAdapter, IDXGIOutput, CaptureRegion)> {
    let factory: IDXGIFactory1 =
        unsafe { CreateDXGIFactory1() }.context("CreateDXGIFactory1 failed")?;

    let mut adapter_idx = 0u32;
    loop {
        let adapter = match unsafe { factory.EnumAdapters1(adapter_idx) } {
            Ok(a) => a,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
            Err(e) => {
                return Err(anyhow::Error::from(e)
                    .context(format!("EnumAdapters1({}) failed", adapter_idx)));
            }
        };
        let adapter: IDXGIAdapter = adapter
            .cast()
            .context("failed to cast IDXGIAdapter1 to IDXGIAdapter")?;

        let mut output_idx = 0u32;
        loop {
            let output = match unsafe { adapter.EnumOutputs(output_idx) } {
                Ok(o) => o,
                Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(e) => {
                    return Err(anyhow::Error::from(e)
                        .context(format!("EnumOutputs({}) failed", output_idx)));
                }
            };
            let desc = unsafe { output.GetDesc() }.context("IDXGIOutput::GetDesc failed")?;
            let rect = desc.DesktopCoordinates;
            if desc.AttachedToDesktop.as_bool() && rect.left == 0 && rect.top == 0 {
                let bounds =
                    CaptureRegion::from_edges(rect.left, rect.top, rect.right, rect.bottom)
                        .map_err(|e| anyhow!("primary output has invalid bounds: {}", e))?;
                return Ok((adapter, output, bounds));
            }
            output_idx += 1;
        }
        adapter_idx += 1;
    }

    Err(anyhow!("no display output is attached at the desktop origin"))
}

fn create_device(adapter: &IDXGIAdapter) -> anyhow::Result<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;
    let feature_levels = [D3D_FEATURE_LEVEL_11_0];

    unsafe {
        D3D11CreateDevice(
            adapter,
            D3D_DRIVER_TYPE_UNKNOWN,
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            Some(&feature_levels),
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
    }
    .context("D3D11CreateDevice failed")?;

    Ok((
        device.context("D3D11CreateDevice did not return a device")?,
        context.context("D3D11CreateDevice did not return a device context")?,
    ))
}

fn duplicate(output: &IDXGIOutput1, device: &ID3D11Device) -> anyhow::Result<IDXGIOutputDuplication> {
    unsafe { output.DuplicateOutput(device) }.context("DuplicateOutput failed")
}

/// Device, duplication interface and staging texture for the primary output.
///
/// The device outlives any number of duplication interfaces; access loss only
/// drops `duplication`.
pub struct DuplicationCapturer {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    output: IDXGIOutput1,
    duplication: Option<IDXGIOutputDuplication>,
    staging: Option<ID3D11Texture2D>,
    bounds: CaptureRegion,
}

// SAFETY: the capturer is only touched while the frame source holds its
// session mutex, so the COM objects are never used from two threads at once.
unsafe impl Send for DuplicationCapturer {}

impl DuplicationCapturer {
    pub fn open() -> Result<Self> {
        let (adapter, output, bounds) =
            find_primary_output().map_err(|e| DeskshotError::resource_init(format!("{:#}", e)))?;
        let output: IDXGIOutput1 = output
            .cast()
            .map_err(|e| DeskshotError::resource_init(format!("IDXGIOutput1 unavailable: {}", e)))?;
        let (device, context) =
            create_device(&adapter).map_err(|e| DeskshotError::resource_init(format!("{:#}", e)))?;
        let duplication = duplicate(&output, &device)
            .map_err(|e| DeskshotError::resource_init(format!("{:#}", e)))?;

        tracing::debug!(
            "Duplication created for output {}x{}",
            bounds.width,
            bounds.height
        );
        Ok(Self {
            device,
            context,
            output,
            duplication: Some(duplication),
            staging: None,
            bounds,
        })
    }

    /// Returns a staging texture matching `desc`, recreating it when the
    /// desktop size changed.
    fn ensure_staging(&mut self, desc: &D3D11_TEXTURE2D_DESC) -> anyhow::Result<ID3D11Texture2D> {
        if let Some(existing) = &self.staging {
            let mut current = D3D11_TEXTURE2D_DESC::default();
            unsafe { existing.GetDesc(&mut current) };
            if current.Width == desc.Width
                && current.Height == desc.Height
                && current.Format == desc.Format
            {
                return Ok(existing.clone());
            }
        }

        let staging_desc = D3D11_TEXTURE2D_DESC {
            Width: desc.Width,
            Height: desc.Height,
            MipLevels: 1,
            ArraySize: 1,
            Format: desc.Format,
            SampleDesc: desc.SampleDesc,
            Usage: D3D11_USAGE_STAGING,
            BindFlags: Default::default(),
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: Default::default(),
        };
        let mut staging: Option<ID3D11Texture2D> = None;
        unsafe {
            self.device
                .CreateTexture2D(&staging_desc, None, Some(&mut staging))
        }
        .context("CreateTexture2D (staging) failed")?;
        let staging = staging.context("CreateTexture2D returned no texture")?;
        self.staging = Some(staging.clone());
        Ok(staging)
    }

    fn read_frame(&mut self, resource: IDXGIResource) -> anyhow::Result<PixelBuffer> {
        let texture: ID3D11Texture2D = resource
            .cast()
            .context("acquired resource is not a 2D texture")?;
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };

        let staging = self.ensure_staging(&desc)?;
        let staging_resource: ID3D11Resource = staging.cast()?;
        unsafe {
            self.context
                .CopyResource(&staging_resource, &texture.cast::<ID3D11Resource>()?);
        }

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context
                .Map(&staging_resource, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
        }
        .context("Map (staging) failed")?;

        let pitch = mapped.RowPitch as usize;
        let src = unsafe {
            std::slice::from_raw_parts(mapped.pData as *const u8, pitch * desc.Height as usize)
        };
        let pixels = PixelBuffer::from_pitched(src, pitch, desc.Width, desc.Height, PixelFormat::Bgra8);
        unsafe { self.context.Unmap(&staging_resource, 0) };

        pixels.map_err(|e| anyhow!("copying mapped frame failed: {}", e))
    }
}

fn release_lost_access(code: HRESULT) -> bool {
    code == DXGI_ERROR_ACCESS_LOST
}

impl DuplicationSession for DuplicationCapturer {
    fn output_bounds(&self) -> CaptureRegion {
        self.bounds
    }

    fn has_duplication(&self) -> bool {
        self.duplication.is_some()
    }

    fn acquire(&mut self, timeout: Duration) -> Result<AcquireOutcome> {
        let Some(duplication) = self.duplication.clone() else {
            return Ok(AcquireOutcome::AccessLost);
        };

        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        if let Err(e) = unsafe { duplication.AcquireNextFrame(timeout_ms, &mut info, &mut resource) } {
            if e.code() == DXGI_ERROR_WAIT_TIMEOUT {
                return Ok(AcquireOutcome::Timeout);
            }
            if e.code() == DXGI_ERROR_ACCESS_LOST {
                self.duplication = None;
                return Ok(AcquireOutcome::AccessLost);
            }
            return Err(DeskshotError::Platform(
                anyhow::Error::from(e).context("AcquireNextFrame failed"),
            ));
        }

        let result = match resource {
            Some(resource) => self.read_frame(resource),
            None => Err(anyhow!("AcquireNextFrame returned no resource")),
        };
        if let Err(e) = unsafe { duplication.ReleaseFrame() } {
            if release_lost_access(e.code()) {
                // The frame already copied is still good; the next call
                // recreates the interface before acquiring.
                tracing::warn!("ReleaseFrame reported access lost");
                self.duplication = None;
            } else {
                tracing::debug!("ReleaseFrame failed: {}", e);
            }
        }

        Ok(AcquireOutcome::Frame(result.map_err(DeskshotError::Platform)?))
    }

    fn recreate_duplication(&mut self) -> Result<()> {
        self.duplication = None;
        let desc = unsafe { self.output.GetDesc() }
            .context("IDXGIOutput::GetDesc failed")
            .map_err(DeskshotError::Platform)?;
        let rect = desc.DesktopCoordinates;
        self.bounds = CaptureRegion::from_edges(rect.left, rect.top, rect.right, rect.bottom)?;

        let duplication = duplicate(&self.output, &self.device).map_err(DeskshotError::Platform)?;
        self.duplication = Some(duplication);
        tracing::info!(
            "Duplication recreated for output {}x{}",
            self.bounds.width,
            self.bounds.height
        );
        Ok(())
    }
}
