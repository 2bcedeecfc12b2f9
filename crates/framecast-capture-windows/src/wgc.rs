//! Windows.Graphics.Capture implementation of the capture pipeline and
//! the public [`CaptureSession`].
//!
//! Requires Windows 10 1803+ (build 17134). The `FrameArrived` and
//! `Closed` callbacks hold only a weak reference to the session core, so
//! a dropped session cannot be revived by a late platform notification.

use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use tracing::info;
use windows::core::{IInspectable, Interface};
use windows::Foundation::{EventRegistrationToken, TypedEventHandler};
use windows::Graphics::Capture::{
    Direct3D11CaptureFrame, Direct3D11CaptureFramePool, GraphicsCaptureItem,
    GraphicsCaptureSession,
};
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Graphics::SizeInt32;
use windows::Win32::Foundation::BOOL;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D, D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_ALPHA_MODE_PREMULTIPLIED, DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    IDXGIAdapter, IDXGIDevice, IDXGIFactory2, IDXGISwapChain1, DXGI_PRESENT,
    DXGI_SCALING_STRETCH, DXGI_SWAP_CHAIN_DESC1, DXGI_SWAP_CHAIN_FLAG,
    DXGI_SWAP_EFFECT_FLIP_SEQUENTIAL, DXGI_USAGE_RENDER_TARGET_OUTPUT,
};

use framecast_core::{CaptureError, CaptureResult, FrameSink, FrameSize, PixelRect};

use crate::com::ComGuard;
use crate::d3d11;
use crate::engine::{CapturePipeline, SessionCore};
use crate::interop;
use crate::target::CaptureTarget;
use crate::SessionConfig;

const FRAME_POOL_BUFFERS: i32 = 2;
const PIXEL_FORMAT: DirectXPixelFormat = DirectXPixelFormat::B8G8R8A8UIntNormalized;
const SWAP_CHAIN_FORMAT: DXGI_FORMAT = DXGI_FORMAT_B8G8R8A8_UNORM;

// ── CaptureSession ────────────────────────────────────────────────────────────

/// A capture session bound to one window or display.
///
/// Create it, bind a [`FrameSink`], then [`start`](Self::start). Frames
/// are delivered on WGC worker threads until [`stop`](Self::stop) is
/// called or the target closes. A stopped session cannot be restarted;
/// create a new one for each capture.
pub struct CaptureSession {
    core: Arc<SessionCore<WgcPipeline>>,
    config: SessionConfig,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            core: Arc::new(SessionCore::new()),
            config,
        }
    }

    /// Bind the frame consumer. Fails with
    /// [`CaptureError::InvalidState`] while the session is running.
    pub fn set_frame_sink(&self, sink: Box<dyn FrameSink>) -> CaptureResult<()> {
        self.core.set_frame_sink(sink)
    }

    /// Register a listener fired exactly once when the session actually
    /// stops — whether through [`stop`](Self::stop), a pump failure, or
    /// the capture target going away.
    pub fn on_session_stopped(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.core.on_session_stopped(listener);
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Resolve `target` and start capturing it.
    ///
    /// Fails with [`CaptureError::InvalidTarget`] when the target does
    /// not resolve to a capture item; nothing is left allocated in that
    /// case.
    pub fn start(&self, target: &CaptureTarget) -> CaptureResult<()> {
        if self.core.is_running() {
            return Err(CaptureError::invalid_state("session is already running"));
        }
        let (pipeline, initial_size) =
            open_pipeline(target, &self.config, Arc::downgrade(&self.core))?;
        info!(size = %initial_size, "starting capture session");
        self.core.start_with(pipeline, initial_size)
    }

    /// Stop capturing and release every GPU resource.
    ///
    /// Idempotent. Blocks until any in-flight frame callback has
    /// finished, so all resources are released the moment this returns.
    pub fn stop(&self) {
        self.core.stop();
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.core.stop();
    }
}

// ── WgcPipeline ───────────────────────────────────────────────────────────────

/// GPU pipeline for one session: D3D11 device, composition swap chain,
/// WGC frame pool, and the platform capture session.
///
/// Declared in teardown order: the session closes before the frame pool,
/// the pool before the swap chain and devices, COM last.
pub(crate) struct WgcPipeline {
    session: GraphicsCaptureSession,
    frame_pool: Direct3D11CaptureFramePool,
    swap_chain: IDXGISwapChain1,
    item: GraphicsCaptureItem,
    winrt_device: IDirect3DDevice,
    context: ID3D11DeviceContext,
    device: ID3D11Device,
    frame_arrived_token: Option<EventRegistrationToken>,
    closed_token: Option<EventRegistrationToken>,
    _com: ComGuard,
}

// SAFETY: the COM/WinRT objects are only touched under the owning
// session's pump lock — the FrameArrived and Closed handlers call back
// into `SessionCore`, which serializes every access — and the D3D11
// device is created without the single-threaded flag, as the
// free-threaded frame pool requires.
unsafe impl Send for WgcPipeline {}

impl CapturePipeline for WgcPipeline {
    type Frame = CapturedGpuFrame;

    fn start_capture(&mut self) -> CaptureResult<()> {
        self.session
            .StartCapture()
            .context("GraphicsCaptureSession::StartCapture failed")?;
        Ok(())
    }

    fn try_acquire_frame(&mut self) -> Option<CapturedGpuFrame> {
        self.frame_pool
            .TryGetNextFrame()
            .ok()
            .map(CapturedGpuFrame)
    }

    fn content_size(&self, frame: &CapturedGpuFrame) -> CaptureResult<FrameSize> {
        let size = frame
            .0
            .ContentSize()
            .context("Direct3D11CaptureFrame::ContentSize failed")?;
        Ok(FrameSize::new(size.Width, size.Height))
    }

    fn resize_targets(&mut self, size: FrameSize) -> CaptureResult<()> {
        unsafe {
            self.swap_chain.ResizeBuffers(
                FRAME_POOL_BUFFERS as u32,
                size.width.max(0) as u32,
                size.height.max(0) as u32,
                SWAP_CHAIN_FORMAT,
                DXGI_SWAP_CHAIN_FLAG(0),
            )
        }
        .context("IDXGISwapChain1::ResizeBuffers failed")?;
        Ok(())
    }

    fn with_staged_pixels(
        &mut self,
        frame: &CapturedGpuFrame,
        size: FrameSize,
        consume: &mut dyn FnMut(PixelRect<'_>),
    ) -> CaptureResult<()> {
        let surface = frame
            .0
            .Surface()
            .context("Direct3D11CaptureFrame::Surface failed")?;
        let frame_texture = d3d11::texture_from_surface(&surface)?;
        let back_buffer: ID3D11Texture2D = unsafe { self.swap_chain.GetBuffer(0) }
            .context("IDXGISwapChain1::GetBuffer failed")?;

        // One staging texture per frame; it is unmapped and released
        // before this invocation returns.
        let staging = d3d11::create_staging_texture(&self.device, size)?;
        unsafe {
            self.context.CopyResource(&back_buffer, &frame_texture);
            self.context.CopyResource(&staging, &frame_texture);
        }

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context
                .Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
        }
        .context("mapping the staging texture failed")?;

        let row_pitch = mapped.RowPitch as usize;
        let len = row_pitch * size.height.max(0) as usize;
        let bytes = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, len) };
        consume(PixelRect::new(bytes, row_pitch));

        unsafe { self.context.Unmap(&staging, 0) };
        Ok(())
    }

    fn present(&mut self) -> CaptureResult<()> {
        unsafe { self.swap_chain.Present(0, DXGI_PRESENT(0)) }
            .ok()
            .context("IDXGISwapChain1::Present failed")?;
        Ok(())
    }

    fn recreate_pool(&mut self, size: FrameSize) -> CaptureResult<()> {
        self.frame_pool
            .Recreate(
                &self.winrt_device,
                PIXEL_FORMAT,
                FRAME_POOL_BUFFERS,
                SizeInt32 {
                    Width: size.width,
                    Height: size.height,
                },
            )
            .context("Direct3D11CaptureFramePool::Recreate failed")?;
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(token) = self.frame_arrived_token.take() {
            let _ = self.frame_pool.RemoveFrameArrived(token);
        }
        if let Some(token) = self.closed_token.take() {
            let _ = self.item.RemoveClosed(token);
        }
        let _ = self.session.Close();
        let _ = self.frame_pool.Close();
    }
}

impl Drop for WgcPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Owned WGC frame; the underlying GPU buffer returns to the pool on
/// drop, before the swap chain presents.
pub(crate) struct CapturedGpuFrame(Direct3D11CaptureFrame);

impl Drop for CapturedGpuFrame {
    fn drop(&mut self) {
        let _ = self.0.Close();
    }
}

// ── Pipeline construction ─────────────────────────────────────────────────────

/// Build the full GPU pipeline for `target` and wire its notifications
/// to the session core.
///
/// The event handlers hold only a weak reference; once the session
/// drops, a late callback upgrades to nothing and returns. On any
/// failure every resource constructed so far is released by drop before
/// the error propagates.
fn open_pipeline(
    target: &CaptureTarget,
    config: &SessionConfig,
    core: Weak<SessionCore<WgcPipeline>>,
) -> CaptureResult<(WgcPipeline, FrameSize)> {
    let com = ComGuard::init_multithreaded()?;
    let (device, context) = d3d11::create_device()?;
    let winrt_device = d3d11::create_winrt_device(&device)?;

    // Resolution happens after device creation, so a target that fails to
    // resolve releases the device on this early return.
    let Some(item) = resolve_item(target)? else {
        return Err(CaptureError::invalid_target(
            "target did not resolve to a capture item",
        ));
    };

    let closed_core = core.clone();
    let closed_token = item
        .Closed(
            &TypedEventHandler::<GraphicsCaptureItem, IInspectable>::new(move |_, _| {
                // The capture target went away (window closed or display
                // disconnected). stop() is idempotent, so a duplicate
                // notification cannot double-teardown.
                if let Some(core) = closed_core.upgrade() {
                    core.stop();
                }
                Ok(())
            }),
        )
        .context("GraphicsCaptureItem::Closed registration failed")?;

    let item_size = item.Size().context("GraphicsCaptureItem::Size failed")?;
    let initial_size = FrameSize::new(item_size.Width, item_size.Height);

    let swap_chain = create_swap_chain(&device, initial_size)?;

    let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
        &winrt_device,
        PIXEL_FORMAT,
        FRAME_POOL_BUFFERS,
        item_size,
    )
    .context("Direct3D11CaptureFramePool::CreateFreeThreaded failed")?;

    let session = frame_pool
        .CreateCaptureSession(&item)
        .context("Direct3D11CaptureFramePool::CreateCaptureSession failed")?;
    // Both toggles are best-effort: not every Windows build exposes them.
    let _ = session.SetIsBorderRequired(config.show_border);
    let _ = session.SetIsCursorCaptureEnabled(config.capture_cursor);

    let frame_arrived_token = frame_pool
        .FrameArrived(&TypedEventHandler::<
            Direct3D11CaptureFramePool,
            IInspectable,
        >::new(move |_, _| {
            if let Some(core) = core.upgrade() {
                core.on_frame_arrived();
            }
            Ok(())
        }))
        .context("Direct3D11CaptureFramePool::FrameArrived registration failed")?;

    Ok((
        WgcPipeline {
            session,
            frame_pool,
            swap_chain,
            item,
            winrt_device,
            context,
            device,
            frame_arrived_token: Some(frame_arrived_token),
            closed_token: Some(closed_token),
            _com: com,
        },
        initial_size,
    ))
}

fn resolve_item(target: &CaptureTarget) -> Result<Option<GraphicsCaptureItem>> {
    match target {
        CaptureTarget::Window(window) => interop::item_for_window(*window),
        CaptureTarget::Display(display) => interop::item_for_display(*display),
        CaptureTarget::Item(item) => Ok(Some(item.clone())),
    }
}

/// Create the double-buffered BGRA composition swap chain the captured
/// frames are presented through.
fn create_swap_chain(device: &ID3D11Device, size: FrameSize) -> Result<IDXGISwapChain1> {
    let dxgi_device: IDXGIDevice = device
        .cast()
        .context("failed to cast ID3D11Device to IDXGIDevice")?;
    let adapter: IDXGIAdapter =
        unsafe { dxgi_device.GetAdapter() }.context("IDXGIDevice::GetAdapter failed")?;
    let factory: IDXGIFactory2 =
        unsafe { adapter.GetParent() }.context("IDXGIAdapter::GetParent failed")?;

    let desc = DXGI_SWAP_CHAIN_DESC1 {
        Width: size.width.max(0) as u32,
        Height: size.height.max(0) as u32,
        Format: SWAP_CHAIN_FORMAT,
        Stereo: BOOL::from(false),
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
        BufferCount: FRAME_POOL_BUFFERS as u32,
        Scaling: DXGI_SCALING_STRETCH,
        SwapEffect: DXGI_SWAP_EFFECT_FLIP_SEQUENTIAL,
        AlphaMode: DXGI_ALPHA_MODE_PREMULTIPLIED,
        Flags: 0,
    };
    unsafe { factory.CreateSwapChainForComposition(device, &desc, None) }
        .context("IDXGIFactory2::CreateSwapChainForComposition failed")
}
