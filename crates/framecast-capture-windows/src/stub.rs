//! Non-Windows stub for [`CaptureSession`] (CI + cross-compilation).
//!
//! The session state machine is the real one — sink binding and stop
//! idempotence behave exactly as on Windows — but `start` always fails,
//! since Windows.Graphics.Capture does not exist here.

use std::sync::Arc;

use framecast_core::{CaptureError, CaptureResult, FrameSink, FrameSize, PixelRect};

use crate::engine::{CapturePipeline, SessionCore};
use crate::target::CaptureTarget;
use crate::SessionConfig;

pub(crate) struct StubPipeline;

impl CapturePipeline for StubPipeline {
    type Frame = ();

    fn start_capture(&mut self) -> CaptureResult<()> {
        Ok(())
    }

    fn try_acquire_frame(&mut self) -> Option<()> {
        None
    }

    fn content_size(&self, _frame: &()) -> CaptureResult<FrameSize> {
        Ok(FrameSize::ZERO)
    }

    fn resize_targets(&mut self, _size: FrameSize) -> CaptureResult<()> {
        Ok(())
    }

    fn with_staged_pixels(
        &mut self,
        _frame: &(),
        _size: FrameSize,
        _consume: &mut dyn FnMut(PixelRect<'_>),
    ) -> CaptureResult<()> {
        Ok(())
    }

    fn present(&mut self) -> CaptureResult<()> {
        Ok(())
    }

    fn recreate_pool(&mut self, _size: FrameSize) -> CaptureResult<()> {
        Ok(())
    }

    fn shutdown(&mut self) {}
}

/// Stub capture session with the same API surface as the Windows one.
pub struct CaptureSession {
    core: Arc<SessionCore<StubPipeline>>,
    #[allow(dead_code)]
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

    pub fn set_frame_sink(&self, sink: Box<dyn FrameSink>) -> CaptureResult<()> {
        self.core.set_frame_sink(sink)
    }

    pub fn on_session_stopped(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.core.on_session_stopped(listener);
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    pub fn start(&self, _target: &CaptureTarget) -> CaptureResult<()> {
        tracing::info!("capture session start requested on a non-Windows target");
        Err(CaptureError::backend_unavailable(
            "Windows.Graphics.Capture is only available on Windows",
        ))
    }

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

#[cfg(test)]
mod tests {
    use super::CaptureSession;
    use crate::target::{CaptureTarget, DisplayId};
    use framecast_core::CaptureError;

    #[test]
    fn start_reports_backend_unavailable() {
        let session = CaptureSession::new();
        let target = CaptureTarget::Display(DisplayId::from_raw_handle(1));

        let result = session.start(&target);

        assert!(matches!(
            result,
            Err(CaptureError::BackendUnavailable { .. })
        ));
        assert!(!session.is_running());
    }
}
