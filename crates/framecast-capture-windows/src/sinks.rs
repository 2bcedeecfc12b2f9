//! Built-in frame sinks.

use std::time::{SystemTime, UNIX_EPOCH};

use framecast_core::{FrameSink, PixelRect};
use tokio::sync::mpsc;
use tracing::debug;

/// A raw captured video frame (BGRA8, tightly packed, CPU-side).
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub data: Vec<u8>,
    pub pts_ms: u64,
    pub width: i32,
    pub height: i32,
}

/// Forwards a tightly packed copy of each frame into a bounded channel.
///
/// Bridges the synchronous capture pump to async consumers: frames are
/// dropped, never blocked on, when the receiver falls behind, and the
/// channel closes when the owning session stops.
pub struct ChannelSink {
    tx: mpsc::Sender<CapturedFrame>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CapturedFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&mut self, rect: PixelRect<'_>, width: i32, height: i32) {
        let frame = CapturedFrame {
            data: rect.to_tightly_packed(width, height),
            pts_ms: ts_ms(),
            width,
            height,
        };
        if self.tx.try_send(frame).is_err() {
            debug!("frame receiver is behind; dropping frame");
        }
    }
}

fn ts_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::ChannelSink;
    use framecast_core::{FrameSink, PixelRect};

    #[test]
    fn packs_rows_and_forwards_through_channel() {
        let (mut sink, mut frames) = ChannelSink::new(4);

        // 2×2 pixels with a 12-byte pitch (4 bytes of padding per row).
        let data: Vec<u8> = (0u8..24).collect();
        sink.send_frame(PixelRect::new(&data, 12), 2, 2);

        let frame = frames.try_recv().expect("one frame queued");
        assert_eq!((frame.width, frame.height), (2, 2));
        assert_eq!(
            frame.data,
            vec![0, 1, 2, 3, 4, 5, 6, 7, 12, 13, 14, 15, 16, 17, 18, 19]
        );
    }

    #[test]
    fn drops_frames_when_the_channel_is_full() {
        let (mut sink, mut frames) = ChannelSink::new(1);
        let data = vec![0u8; 4];

        sink.send_frame(PixelRect::new(&data, 4), 1, 1);
        sink.send_frame(PixelRect::new(&data, 4), 1, 1);

        assert!(frames.try_recv().is_ok());
        assert!(frames.try_recv().is_err());
    }

    #[test]
    fn channel_closes_when_sink_drops() {
        let (sink, mut frames) = ChannelSink::new(1);
        drop(sink);

        assert!(matches!(
            frames.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
