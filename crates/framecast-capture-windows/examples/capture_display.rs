//! Capture the primary display and print frame geometry for ~120 frames.
//!
//! Run with `RUST_LOG=debug` to watch the pump and resize protocol.

use anyhow::Result;
use framecast_capture_windows::{discovery, CaptureSession, CaptureTarget, ChannelSink};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    if !discovery::capture_supported() {
        anyhow::bail!("graphics capture is not supported on this system");
    }
    if !discovery::request_capture_access()? {
        anyhow::bail!("capture access was denied");
    }

    let displays = discovery::list_displays()?;
    let Some(display) = displays.iter().find(|d| d.is_primary).or_else(|| displays.first())
    else {
        anyhow::bail!("no displays found");
    };
    let display_title = &display.title;
    info!("capturing {}", display_title);

    let (sink, mut frames) = ChannelSink::new(8);
    let session = CaptureSession::new();
    session.on_session_stopped(|| info!("capture session stopped"));
    session.set_frame_sink(Box::new(sink))?;
    session.start(&CaptureTarget::Display(display.id))?;

    let mut received = 0u32;
    while received < 120 {
        let Some(frame) = frames.recv().await else {
            break;
        };
        received += 1;
        if received % 30 == 0 {
            info!(
                "frame {received}: {}x{} ({} bytes)",
                frame.width,
                frame.height,
                frame.data.len()
            );
        }
    }

    session.stop();
    Ok(())
}
