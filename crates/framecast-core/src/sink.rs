use crate::PixelRect;

/// Consumer of decoded frames during a capture session.
///
/// A sink is bound to at most one session at a time, and only while that
/// session is stopped. The engine invokes [`send_frame`](Self::send_frame)
/// on the capture worker thread with the frame serialization lock held, so
/// implementations must return promptly — a slow sink delays delivery of
/// every subsequent frame.
///
/// The engine calls [`close`](Self::close) exactly once when the owning
/// session stops, and guarantees that no `send_frame` call begins after
/// `close` does.
pub trait FrameSink: Send {
    /// Accept one mapped pixel rectangle of `width`×`height` BGRA pixels.
    ///
    /// `rect` borrows mapped GPU staging memory and is only valid for the
    /// duration of this call.
    fn send_frame(&mut self, rect: PixelRect<'_>, width: i32, height: i32);

    /// Release any resources held by the sink.
    fn close(&mut self) {}
}
