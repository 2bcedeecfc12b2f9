use serde::{Deserialize, Serialize};

/// Dimensions of a captured surface, as reported by the platform.
///
/// Signed because the platform reports signed extents; a non-positive
/// dimension means the source is gone or not yet measurable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: i32,
    pub height: i32,
}

impl FrameSize {
    pub const ZERO: Self = Self {
        width: 0,
        height: 0,
    };

    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

/// One mapped frame handed to a [`FrameSink`](crate::FrameSink).
///
/// `data` spans `row_pitch` bytes per row of 32-bit BGRA pixels. The row
/// pitch may exceed `width * 4` due to hardware alignment, so consumers
/// must step rows by pitch rather than assume tight packing. The lifetime
/// ties the descriptor to the mapped staging memory backing it: the bytes
/// are unmapped as soon as the delivering `send_frame` call returns.
#[derive(Clone, Copy)]
pub struct PixelRect<'a> {
    data: &'a [u8],
    row_pitch: usize,
}

impl<'a> PixelRect<'a> {
    pub fn new(data: &'a [u8], row_pitch: usize) -> Self {
        Self { data, row_pitch }
    }

    /// The raw mapped bytes, including any per-row alignment padding.
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Bytes from the start of one row to the start of the next.
    pub fn row_pitch(&self) -> usize {
        self.row_pitch
    }

    /// The pixel data of row `y`, `width` pixels wide, without padding.
    pub fn row(&self, y: usize, width: usize) -> Option<&'a [u8]> {
        let row_bytes = width.checked_mul(4)?;
        if row_bytes > self.row_pitch {
            return None;
        }
        let start = y.checked_mul(self.row_pitch)?;
        let end = start.checked_add(row_bytes)?;
        self.data.get(start..end)
    }

    /// Copy the rectangle into a tightly packed `width * height * 4` BGRA
    /// buffer, dropping the per-row alignment padding.
    pub fn to_tightly_packed(&self, width: i32, height: i32) -> Vec<u8> {
        let width = width.max(0) as usize;
        let height = height.max(0) as usize;
        let mut packed = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            let Some(row) = self.row(y, width) else {
                break;
            };
            packed.extend_from_slice(row);
        }
        packed
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameSize, PixelRect};

    #[test]
    fn deserializes_frame_size() {
        let size: FrameSize =
            serde_json::from_str(r#"{"width": 1920, "height": 1080}"#).expect("valid size");
        assert_eq!(size, FrameSize::new(1920, 1080));
        assert!(!size.is_empty());
        assert!(FrameSize::ZERO.is_empty());
    }

    #[test]
    fn tight_packing_respects_row_pitch() {
        // 2×2 pixels with a 16-byte pitch (8 bytes of padding per row).
        let mut data = vec![0u8; 32];
        data[0..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[16..24].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);
        let rect = PixelRect::new(&data, 16);

        assert_eq!(rect.row_pitch(), 16);
        assert_eq!(rect.row(1, 2), Some(&data[16..24]));
        assert_eq!(
            rect.to_tightly_packed(2, 2),
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]
        );
    }

    #[test]
    fn row_rejects_out_of_bounds_access() {
        let data = vec![0u8; 32];
        let rect = PixelRect::new(&data, 16);

        assert!(rect.row(2, 2).is_none());
        assert!(rect.row(0, 5).is_none());
        assert_eq!(rect.to_tightly_packed(2, 4).len(), 16);
    }
}
