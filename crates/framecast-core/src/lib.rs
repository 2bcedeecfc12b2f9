//! Core types shared by every Framecast crate: frame geometry, the mapped
//! pixel-rectangle descriptor, the [`FrameSink`] consumer contract, and the
//! error taxonomy.

pub mod errors;
pub mod sink;
pub mod types;

pub use errors::{CaptureError, CaptureResult};
pub use sink::FrameSink;
pub use types::{FrameSize, PixelRect};
