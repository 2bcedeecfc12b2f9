//! framecast-capture-windows — Windows.Graphics.Capture (WGC) session engine.
//!
//! Captures a window or display with WGC and hands each frame's pixels to a
//! [`FrameSink`] as a CPU-mapped BGRA rectangle. Requires Windows 10 1803+;
//! on non-Windows targets a stub is compiled for CI compatibility.
//!
//! # Windows pipeline
//!
//! ```text
//! WindowId / DisplayId
//!   │  IGraphicsCaptureItemInterop::CreateForWindow / CreateForMonitor
//!   ▼
//! GraphicsCaptureItem ──── Closed ─────────────────► CaptureSession::stop()
//!   │  Direct3D11CaptureFramePool::CreateFreeThreaded (BGRA8, 2 buffers)
//!   ▼
//! GraphicsCaptureSession::StartCapture()
//!   │  FrameArrived callback (worker thread, pump lock held)
//!   ▼
//! resize check → back buffer + staging texture ← CopyResource → Map
//!   │
//!   ▼
//! FrameSink::send_frame(PixelRect, w, h) → Unmap → Present → Recreate*
//! ```
//!
//! `*` the frame pool is recreated only after a resize.
//!
//! # Threading model
//!
//! WGC `FrameArrived` callbacks arrive on a thread-pool thread. One
//! exclusive lock per session serializes every frame callback against
//! teardown, so `stop()` returning means no copy is in flight and every
//! GPU resource has been released.

mod engine;
mod target;

pub mod discovery;
pub mod helper;
pub mod sinks;

#[cfg(windows)]
mod com;
#[cfg(windows)]
mod d3d11;
#[cfg(windows)]
mod interop;
#[cfg(windows)]
mod wgc;
#[cfg(windows)]
pub use wgc::CaptureSession;

#[cfg(not(windows))]
mod stub;
#[cfg(not(windows))]
pub use stub::CaptureSession;

pub use discovery::{DisplayInfo, WindowInfo};
pub use helper::{capture_display, capture_raw_window_handle, capture_window};
pub use sinks::{CapturedFrame, ChannelSink};
pub use target::{CaptureTarget, DisplayId, WindowId};

pub use framecast_core::{CaptureError, CaptureResult, FrameSink, FrameSize, PixelRect};

/// Tuning for a single capture session.
///
/// Defaults match what a streaming consumer wants: no capture border
/// around the source and no cursor composited into the captured output.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Render the cursor into captured frames.
    pub capture_cursor: bool,

    /// Keep the OS capture border around the captured target. Honored on
    /// Windows 11 22H2+; older builds always draw it.
    pub show_border: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture_cursor: false,
            show_border: false,
        }
    }
}
