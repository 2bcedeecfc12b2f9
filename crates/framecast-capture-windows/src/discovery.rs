//! Capture-target discovery: capturable displays, visible top-level
//! windows, and the OS support/permission checks that gate them.

use framecast_core::CaptureResult;

use crate::target::{DisplayId, WindowId};

/// A display that can be offered for capture.
#[derive(Debug, Clone)]
pub struct DisplayInfo {
    pub id: DisplayId,
    /// Device name plus dimensions, e.g. `\\.\DISPLAY1 -- 2560 x 1440`.
    pub title: String,
    pub width: i32,
    pub height: i32,
    pub is_primary: bool,
}

/// A visible top-level window that can be offered for capture.
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
}

/// Whether this OS supports Windows.Graphics.Capture at all.
pub fn capture_supported() -> bool {
    #[cfg(windows)]
    {
        platform::capture_supported()
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Ask the OS for programmatic capture access. Returns `Ok(false)` when
/// the user or policy denied it.
pub fn request_capture_access() -> CaptureResult<bool> {
    #[cfg(windows)]
    {
        platform::request_capture_access()
    }
    #[cfg(not(windows))]
    {
        Err(unavailable())
    }
}

/// Enumerate attached displays, sorted by title.
pub fn list_displays() -> CaptureResult<Vec<DisplayInfo>> {
    #[cfg(windows)]
    {
        platform::list_displays()
    }
    #[cfg(not(windows))]
    {
        Err(unavailable())
    }
}

/// Enumerate visible, titled top-level windows, sorted by title.
///
/// Untitled windows are skipped: they are overwhelmingly tool and helper
/// windows that make poor capture candidates.
pub fn list_windows() -> CaptureResult<Vec<WindowInfo>> {
    #[cfg(windows)]
    {
        platform::list_windows()
    }
    #[cfg(not(windows))]
    {
        Err(unavailable())
    }
}

#[cfg(not(windows))]
fn unavailable() -> framecast_core::CaptureError {
    framecast_core::CaptureError::backend_unavailable(
        "capture-target discovery is only available on Windows",
    )
}

#[cfg(windows)]
mod platform {
    use anyhow::Context;
    use windows::Graphics::Capture::{
        GraphicsCaptureAccess, GraphicsCaptureAccessKind, GraphicsCaptureSession,
    };
    use windows::Security::Authorization::AppCapabilityAccess::AppCapabilityAccessStatus;
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT};
    use windows::Win32::Graphics::Gdi::{
        EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFO, MONITORINFOEXW,
        MONITORINFOF_PRIMARY,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowTextLengthW, GetWindowTextW, IsWindowVisible,
    };

    use framecast_core::CaptureResult;

    use super::{DisplayInfo, WindowInfo};
    use crate::target::{DisplayId, WindowId};

    pub(super) fn capture_supported() -> bool {
        GraphicsCaptureSession::IsSupported().unwrap_or(false)
    }

    pub(super) fn request_capture_access() -> CaptureResult<bool> {
        let request =
            GraphicsCaptureAccess::RequestAccessAsync(GraphicsCaptureAccessKind::Programmatic)
                .context("GraphicsCaptureAccess::RequestAccessAsync failed")?;
        let status = request
            .get()
            .context("capture access request did not complete")?;
        Ok(status == AppCapabilityAccessStatus::Allowed)
    }

    pub(super) fn list_displays() -> CaptureResult<Vec<DisplayInfo>> {
        let mut handles: Vec<HMONITOR> = Vec::new();

        unsafe extern "system" fn push_monitor(
            hmonitor: HMONITOR,
            _: HDC,
            _: *mut RECT,
            data: LPARAM,
        ) -> BOOL {
            let handles = data.0 as *mut Vec<HMONITOR>;
            unsafe { (*handles).push(hmonitor) };
            BOOL(1)
        }

        unsafe {
            let _ = EnumDisplayMonitors(
                HDC::default(),
                None,
                Some(push_monitor),
                LPARAM(&mut handles as *mut _ as isize),
            );
        }

        let mut displays = Vec::with_capacity(handles.len());
        for hmonitor in handles {
            let mut info = MONITORINFOEXW::default();
            info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;
            let ok = unsafe {
                GetMonitorInfoW(hmonitor, &mut info as *mut MONITORINFOEXW as *mut MONITORINFO)
            };
            if !ok.as_bool() {
                continue;
            }

            let device_len = info
                .szDevice
                .iter()
                .position(|c| *c == 0)
                .unwrap_or(info.szDevice.len());
            let device = String::from_utf16_lossy(&info.szDevice[..device_len]);
            let rect = info.monitorInfo.rcMonitor;
            let width = rect.right - rect.left;
            let height = rect.bottom - rect.top;

            displays.push(DisplayInfo {
                id: DisplayId::from_raw_handle(hmonitor.0 as isize),
                title: format!("{device} -- {width} x {height}"),
                width,
                height,
                is_primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
            });
        }

        displays.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(displays)
    }

    pub(super) fn list_windows() -> CaptureResult<Vec<WindowInfo>> {
        let mut found: Vec<WindowInfo> = Vec::new();

        unsafe extern "system" fn push_window(hwnd: HWND, data: LPARAM) -> BOOL {
            let found = data.0 as *mut Vec<WindowInfo>;
            if !unsafe { IsWindowVisible(hwnd) }.as_bool() {
                return BOOL(1);
            }
            let length = unsafe { GetWindowTextLengthW(hwnd) };
            if length == 0 {
                return BOOL(1);
            }

            let mut title = vec![0u16; length as usize + 1];
            let copied = unsafe { GetWindowTextW(hwnd, &mut title) };
            if copied > 0 {
                unsafe {
                    (*found).push(WindowInfo {
                        id: WindowId::from_raw_handle(hwnd.0 as isize),
                        title: String::from_utf16_lossy(&title[..copied as usize]),
                    });
                }
            }
            BOOL(1)
        }

        unsafe {
            EnumWindows(
                Some(push_window),
                LPARAM(&mut found as *mut _ as isize),
            )
        }
        .context("EnumWindows failed")?;

        found.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(found)
    }
}
