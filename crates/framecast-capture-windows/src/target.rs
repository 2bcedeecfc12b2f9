//! Capture-target descriptors.

#[cfg(windows)]
use windows::Graphics::Capture::GraphicsCaptureItem;

/// Native top-level window handle (an `HWND` value).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowId {
    handle: isize,
}

impl WindowId {
    pub const fn from_raw_handle(raw_handle: isize) -> Self {
        Self { handle: raw_handle }
    }

    pub const fn raw_handle(&self) -> isize {
        self.handle
    }
}

/// Native monitor handle (an `HMONITOR` value).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DisplayId {
    handle: isize,
}

impl DisplayId {
    pub const fn from_raw_handle(raw_handle: isize) -> Self {
        Self { handle: raw_handle }
    }

    pub const fn raw_handle(&self) -> isize {
        self.handle
    }
}

/// What to capture. Immutable once chosen; resolved into a platform
/// capture item when the session starts.
#[derive(Clone, Debug)]
pub enum CaptureTarget {
    /// Capture a top-level window by native window handle.
    Window(WindowId),

    /// Capture a whole display by native monitor handle.
    Display(DisplayId),

    /// Capture an item another component already resolved (e.g. from a
    /// system picker).
    #[cfg(windows)]
    Item(GraphicsCaptureItem),
}
