//! One-call constructors: build a session, bind the sink, and start it.

use framecast_core::{CaptureResult, FrameSink};

use crate::target::{CaptureTarget, DisplayId, WindowId};
use crate::CaptureSession;

/// Start capturing a window.
pub fn capture_window(
    window: WindowId,
    sink: Box<dyn FrameSink>,
) -> CaptureResult<CaptureSession> {
    start_session(CaptureTarget::Window(window), sink)
}

/// Start capturing a display.
pub fn capture_display(
    display: DisplayId,
    sink: Box<dyn FrameSink>,
) -> CaptureResult<CaptureSession> {
    start_session(CaptureTarget::Display(display), sink)
}

/// Start capturing a window given its raw `HWND` value.
pub fn capture_raw_window_handle(
    handle: isize,
    sink: Box<dyn FrameSink>,
) -> CaptureResult<CaptureSession> {
    capture_window(WindowId::from_raw_handle(handle), sink)
}

fn start_session(
    target: CaptureTarget,
    sink: Box<dyn FrameSink>,
) -> CaptureResult<CaptureSession> {
    let session = CaptureSession::new();
    session.set_frame_sink(sink)?;
    session.start(&target)?;
    Ok(session)
}
