//! Session lifecycle and the frame pump, independent of the platform
//! capture pipeline.
//!
//! [`SessionCore`] owns the state machine (`Stopped → Running → Stopped`),
//! the bound [`FrameSink`], and the single exclusion lock that serializes
//! every frame callback against teardown. The GPU side is abstracted
//! behind [`CapturePipeline`] so the lifecycle and resize protocol are
//! exercised by tests on every platform.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use framecast_core::{CaptureError, CaptureResult, FrameSink, FrameSize, PixelRect};
use tracing::{debug, error, info};

/// GPU pipeline for one capture session: swap chain, frame pool, and the
/// platform session object, behind one trait so the engine can run
/// against a mock.
pub(crate) trait CapturePipeline: Send {
    type Frame;

    /// Begin frame production. Called once, immediately before the
    /// session is marked running.
    fn start_capture(&mut self) -> CaptureResult<()>;

    /// Dequeue the next frame if one is ready. `None` means the arrival
    /// notification was spurious, not that something failed.
    fn try_acquire_frame(&mut self) -> Option<Self::Frame>;

    /// The content size the frame itself reports. This, not the capture
    /// item's cached size, is the authority for resize detection.
    fn content_size(&self, frame: &Self::Frame) -> CaptureResult<FrameSize>;

    /// Resize the swap-chain back buffers to `size`, keeping format,
    /// buffer count, and flags unchanged.
    fn resize_targets(&mut self, size: FrameSize) -> CaptureResult<()>;

    /// Copy `frame` into the swap-chain back buffer and a fresh CPU
    /// staging texture of `size`, map the staging texture, and hand the
    /// mapped pixels to `consume`. The staging texture is unmapped and
    /// released before this returns.
    fn with_staged_pixels(
        &mut self,
        frame: &Self::Frame,
        size: FrameSize,
        consume: &mut dyn FnMut(PixelRect<'_>),
    ) -> CaptureResult<()>;

    /// Present the swap chain. Required on every pump invocation, resize
    /// or not, to keep the presentation pipeline advancing.
    fn present(&mut self) -> CaptureResult<()>;

    /// Rebuild the frame pool at `size` so subsequent arrivals use
    /// correctly sized buffers.
    fn recreate_pool(&mut self, size: FrameSize) -> CaptureResult<()>;

    /// Ordered teardown: unsubscribe notifications, then close the
    /// session, frame pool, and swap chain. Device release happens when
    /// the pipeline is dropped.
    fn shutdown(&mut self);
}

struct Inner<P: CapturePipeline> {
    pipeline: Option<P>,
    sink: Option<Box<dyn FrameSink>>,
    last_size: FrameSize,
}

pub(crate) struct SessionCore<P: CapturePipeline> {
    running: AtomicBool,

    /// Set once the session has gone through a full running → stopped
    /// cycle. A stopped session cannot be restarted; each start must
    /// rebuild the full resource set on a fresh session.
    retired: AtomicBool,

    inner: Mutex<Inner<P>>,
    stopped_listeners: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
}

impl<P: CapturePipeline> SessionCore<P> {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                pipeline: None,
                sink: None,
                last_size: FrameSize::ZERO,
            }),
            stopped_listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Bind the frame consumer. Only valid while stopped.
    pub(crate) fn set_frame_sink(&self, sink: Box<dyn FrameSink>) -> CaptureResult<()> {
        let mut inner = self.lock_inner();
        if self.is_running() {
            return Err(CaptureError::invalid_state(
                "cannot change frame sink while running",
            ));
        }
        inner.sink = Some(sink);
        Ok(())
    }

    pub(crate) fn on_session_stopped(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.lock_listeners().push(Arc::new(listener));
    }

    /// Install a fully constructed pipeline, begin capture, and
    /// transition to running.
    pub(crate) fn start_with(&self, mut pipeline: P, initial_size: FrameSize) -> CaptureResult<()> {
        if self.retired.load(Ordering::Acquire) {
            return Err(CaptureError::invalid_state(
                "a stopped session cannot be restarted; create a new session",
            ));
        }
        let mut inner = self.lock_inner();
        if self.is_running() || inner.pipeline.is_some() {
            return Err(CaptureError::invalid_state("session is already running"));
        }
        pipeline.start_capture()?;
        inner.last_size = initial_size;
        inner.pipeline = Some(pipeline);
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop capturing and release every pipeline resource.
    ///
    /// Idempotent: only the call that actually transitions the session
    /// out of running notifies listeners and tears down. Listeners run
    /// before the pump lock is taken so they can react while a frame
    /// callback is still in flight without deadlocking; the teardown then
    /// blocks until that callback finishes.
    pub(crate) fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.retired.store(true, Ordering::Release);
        info!("capture session stopping");
        self.notify_stopped();

        let mut inner = self.lock_inner();
        if let Some(mut pipeline) = inner.pipeline.take() {
            pipeline.shutdown();
        }
        if let Some(mut sink) = inner.sink.take() {
            sink.close();
        }
        inner.last_size = FrameSize::ZERO;
    }

    /// Entry point for the platform's frame-arrival notification.
    ///
    /// Every failure inside the pump is fatal to the session: it is
    /// logged and degrades to a `stop()`, never propagated across the
    /// asynchronous boundary.
    pub(crate) fn on_frame_arrived(&self) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.pump())) {
            Ok(Ok(())) => {}
            Ok(Err(pump_error)) => {
                error!(error = %pump_error, "frame pump failed; stopping capture session");
                self.stop();
            }
            Err(_) => {
                error!("frame pump panicked; stopping capture session");
                self.stop();
            }
        }
    }

    fn pump(&self) -> CaptureResult<()> {
        let mut inner = self.lock_inner();
        if !self.is_running() {
            // Late callback after stop.
            return Ok(());
        }
        let Inner {
            pipeline,
            sink,
            last_size,
        } = &mut *inner;
        let Some(pipeline) = pipeline.as_mut() else {
            return Ok(());
        };
        let Some(frame) = pipeline.try_acquire_frame() else {
            debug!("frame arrival with no frame ready");
            return Ok(());
        };

        let content_size = pipeline.content_size(&frame)?;
        let resized = content_size != *last_size;
        if resized {
            // The captured surface changed size between frames. Resize
            // the swap chain first; this frame only validates the resize
            // and is never forwarded to the sink, since its rectangle was
            // produced against the old geometry.
            debug!(old = %last_size, new = %content_size, "capture source resized");
            *last_size = content_size;
            pipeline.resize_targets(content_size)?;
        }
        let size = *last_size;

        pipeline.with_staged_pixels(&frame, size, &mut |rect| {
            if !resized {
                if let Some(sink) = sink.as_mut() {
                    sink.send_frame(rect, size.width, size.height);
                }
            }
        })?;

        // Retire the frame's GPU buffer back to the pool before present.
        drop(frame);
        pipeline.present()?;

        if resized {
            pipeline.recreate_pool(size)?;
        }
        Ok(())
    }

    fn notify_stopped(&self) {
        let listeners = self.lock_listeners().clone();
        for listener in &listeners {
            listener();
        }
    }

    // A sink that panics mid-frame poisons the lock; teardown must still
    // be able to proceed, so poisoning is recovered rather than bubbled.
    fn lock_inner(&self) -> MutexGuard<'_, Inner<P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<Arc<dyn Fn() + Send + Sync>>> {
        self.stopped_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::{CapturePipeline, SessionCore};
    use framecast_core::{CaptureError, CaptureResult, FrameSink, FrameSize, PixelRect};

    #[derive(Default)]
    struct PipelineLog {
        queued: VecDeque<FrameSize>,
        fail_next_copy: bool,
        started: usize,
        resizes: Vec<FrameSize>,
        recreates: Vec<FrameSize>,
        presents: usize,
        copies: usize,
        shutdowns: usize,
    }

    #[derive(Clone, Default)]
    struct MockPipeline {
        log: Arc<Mutex<PipelineLog>>,
    }

    impl MockPipeline {
        fn push_frame(&self, size: FrameSize) {
            self.log.lock().expect("pipeline log").queued.push_back(size);
        }

        fn fail_next_copy(&self) {
            self.log.lock().expect("pipeline log").fail_next_copy = true;
        }

        fn snapshot<T>(&self, read: impl FnOnce(&PipelineLog) -> T) -> T {
            read(&self.log.lock().expect("pipeline log"))
        }
    }

    impl CapturePipeline for MockPipeline {
        type Frame = FrameSize;

        fn start_capture(&mut self) -> CaptureResult<()> {
            self.log.lock().expect("pipeline log").started += 1;
            Ok(())
        }

        fn try_acquire_frame(&mut self) -> Option<FrameSize> {
            self.log.lock().expect("pipeline log").queued.pop_front()
        }

        fn content_size(&self, frame: &FrameSize) -> CaptureResult<FrameSize> {
            Ok(*frame)
        }

        fn resize_targets(&mut self, size: FrameSize) -> CaptureResult<()> {
            self.log.lock().expect("pipeline log").resizes.push(size);
            Ok(())
        }

        fn with_staged_pixels(
            &mut self,
            _frame: &FrameSize,
            size: FrameSize,
            consume: &mut dyn FnMut(PixelRect<'_>),
        ) -> CaptureResult<()> {
            {
                let mut log = self.log.lock().expect("pipeline log");
                if log.fail_next_copy {
                    log.fail_next_copy = false;
                    return Err(anyhow::anyhow!("staging copy failed").into());
                }
                log.copies += 1;
            }
            // Hardware-style pitch: wider than width * 4.
            let row_pitch = size.width.max(0) as usize * 4 + 64;
            let data = vec![0u8; row_pitch * size.height.max(0) as usize];
            consume(PixelRect::new(&data, row_pitch));
            Ok(())
        }

        fn present(&mut self) -> CaptureResult<()> {
            self.log.lock().expect("pipeline log").presents += 1;
            Ok(())
        }

        fn recreate_pool(&mut self, size: FrameSize) -> CaptureResult<()> {
            self.log.lock().expect("pipeline log").recreates.push(size);
            Ok(())
        }

        fn shutdown(&mut self) {
            self.log.lock().expect("pipeline log").shutdowns += 1;
        }
    }

    #[derive(Default)]
    struct SinkLog {
        frames: Vec<(i32, i32, usize)>,
        closes: usize,
        sent_after_close: bool,
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        log: Arc<Mutex<SinkLog>>,
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&mut self, rect: PixelRect<'_>, width: i32, height: i32) {
            let mut log = self.log.lock().expect("sink log");
            if log.closes > 0 {
                log.sent_after_close = true;
            }
            log.frames.push((width, height, rect.row_pitch()));
        }

        fn close(&mut self) {
            self.log.lock().expect("sink log").closes += 1;
        }
    }

    fn running_session(
        initial: FrameSize,
    ) -> (SessionCore<MockPipeline>, MockPipeline, RecordingSink) {
        let core = SessionCore::new();
        let pipeline = MockPipeline::default();
        let sink = RecordingSink::default();
        core.set_frame_sink(Box::new(sink.clone()))
            .expect("sink binds while stopped");
        core.start_with(pipeline.clone(), initial)
            .expect("session starts");
        (core, pipeline, sink)
    }

    const FHD: FrameSize = FrameSize::new(1920, 1080);
    const HD: FrameSize = FrameSize::new(1280, 720);

    #[test]
    fn delivers_frames_at_steady_size() {
        let (core, pipeline, sink) = running_session(FHD);

        for _ in 0..10 {
            pipeline.push_frame(FHD);
            core.on_frame_arrived();
        }

        let frames = sink.log.lock().expect("sink log").frames.clone();
        assert_eq!(frames.len(), 10);
        for (width, height, pitch) in frames {
            assert_eq!((width, height), (1920, 1080));
            assert!(pitch >= 1920 * 4);
        }
        assert!(pipeline.snapshot(|log| log.resizes.is_empty()));
        assert_eq!(pipeline.snapshot(|log| log.presents), 10);
    }

    #[test]
    fn resize_frame_is_consumed_not_forwarded() {
        let (core, pipeline, sink) = running_session(FHD);

        for _ in 0..10 {
            pipeline.push_frame(FHD);
            core.on_frame_arrived();
        }

        // Frame 11 reports the new size: it triggers the resize and is
        // swallowed.
        pipeline.push_frame(HD);
        core.on_frame_arrived();

        assert_eq!(sink.log.lock().expect("sink log").frames.len(), 10);
        assert_eq!(pipeline.snapshot(|log| log.resizes.clone()), vec![HD]);
        assert_eq!(pipeline.snapshot(|log| log.recreates.clone()), vec![HD]);
        // Present still happens on the resize invocation.
        assert_eq!(pipeline.snapshot(|log| log.presents), 11);

        // Frame 12 at the new size is delivered.
        pipeline.push_frame(HD);
        core.on_frame_arrived();

        let frames = sink.log.lock().expect("sink log").frames.clone();
        assert_eq!(frames.len(), 11);
        assert_eq!((frames[10].0, frames[10].1), (1280, 720));
    }

    #[test]
    fn spurious_arrival_is_benign() {
        let (core, pipeline, sink) = running_session(FHD);

        core.on_frame_arrived();

        assert!(core.is_running());
        assert!(sink.log.lock().expect("sink log").frames.is_empty());
        assert_eq!(pipeline.snapshot(|log| log.presents), 0);
    }

    #[test]
    fn set_frame_sink_while_running_fails() {
        let (core, _pipeline, sink) = running_session(FHD);

        let replacement = RecordingSink::default();
        let result = core.set_frame_sink(Box::new(replacement.clone()));
        assert!(matches!(result, Err(CaptureError::InvalidState { .. })));

        // The original sink is still bound.
        core.stop();
        assert_eq!(sink.log.lock().expect("sink log").closes, 1);
        assert_eq!(replacement.log.lock().expect("sink log").closes, 0);
    }

    #[test]
    fn start_while_running_fails() {
        let (core, _pipeline, _sink) = running_session(FHD);

        let second = MockPipeline::default();
        let result = core.start_with(second.clone(), FHD);
        assert!(matches!(result, Err(CaptureError::InvalidState { .. })));
        assert_eq!(second.snapshot(|log| log.started), 0);
        assert!(core.is_running());
    }

    #[test]
    fn stop_tears_down_pipeline_and_sink_once() {
        let (core, pipeline, sink) = running_session(FHD);
        let stops = Arc::new(Mutex::new(0usize));
        let observed = Arc::clone(&stops);
        core.on_session_stopped(move || {
            *observed.lock().expect("stop counter") += 1;
        });

        core.stop();
        core.stop();

        assert!(!core.is_running());
        assert_eq!(*stops.lock().expect("stop counter"), 1);
        assert_eq!(pipeline.snapshot(|log| log.shutdowns), 1);
        assert_eq!(sink.log.lock().expect("sink log").closes, 1);
    }

    #[test]
    fn no_frame_is_sent_after_sink_close() {
        let (core, pipeline, sink) = running_session(FHD);

        pipeline.push_frame(FHD);
        core.on_frame_arrived();
        core.stop();

        // A late platform callback after teardown is a no-op.
        pipeline.push_frame(FHD);
        core.on_frame_arrived();

        let log = sink.log.lock().expect("sink log");
        assert_eq!(log.frames.len(), 1);
        assert!(!log.sent_after_close);
    }

    #[test]
    fn pump_failure_stops_the_session() {
        let (core, pipeline, _sink) = running_session(FHD);
        let stops = Arc::new(Mutex::new(0usize));
        let observed = Arc::clone(&stops);
        core.on_session_stopped(move || {
            *observed.lock().expect("stop counter") += 1;
        });

        pipeline.fail_next_copy();
        pipeline.push_frame(FHD);
        core.on_frame_arrived();

        assert!(!core.is_running());
        assert_eq!(*stops.lock().expect("stop counter"), 1);
        assert_eq!(pipeline.snapshot(|log| log.shutdowns), 1);
    }

    #[test]
    fn restart_after_stop_is_rejected() {
        let (core, _pipeline, _sink) = running_session(FHD);
        core.stop();

        let fresh = MockPipeline::default();
        let result = core.start_with(fresh.clone(), FHD);
        assert!(matches!(result, Err(CaptureError::InvalidState { .. })));
        assert_eq!(fresh.snapshot(|log| log.started), 0);
    }

    #[test]
    fn stop_before_start_is_silent() {
        let core: SessionCore<MockPipeline> = SessionCore::new();
        let stops = Arc::new(Mutex::new(0usize));
        let observed = Arc::clone(&stops);
        core.on_session_stopped(move || {
            *observed.lock().expect("stop counter") += 1;
        });

        core.stop();

        assert_eq!(*stops.lock().expect("stop counter"), 0);
    }
}
