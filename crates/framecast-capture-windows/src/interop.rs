//! `GraphicsCaptureItem` resolution from native window and monitor
//! handles, via the `IGraphicsCaptureItemInterop` COM factory.

use anyhow::{Context, Result};
use windows::Graphics::Capture::GraphicsCaptureItem;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::HMONITOR;
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;

use crate::target::{DisplayId, WindowId};

fn interop_factory() -> Result<IGraphicsCaptureItemInterop> {
    windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()
        .context("IGraphicsCaptureItemInterop factory unavailable")
}

/// Resolve a window into a capture item. `None` when the window is not a
/// valid capture target (destroyed, cloaked, or otherwise rejected by the
/// compositor).
pub(crate) fn item_for_window(window: WindowId) -> Result<Option<GraphicsCaptureItem>> {
    let interop = interop_factory()?;
    let hwnd = HWND(window.raw_handle() as *mut std::ffi::c_void);
    Ok(unsafe { interop.CreateForWindow(hwnd) }.ok())
}

/// Resolve a monitor into a capture item. `None` when the monitor handle
/// no longer refers to an attached display.
pub(crate) fn item_for_display(display: DisplayId) -> Result<Option<GraphicsCaptureItem>> {
    let interop = interop_factory()?;
    let hmonitor = HMONITOR(display.raw_handle() as *mut std::ffi::c_void);
    Ok(unsafe { interop.CreateForMonitor(hmonitor) }.ok())
}
