//! Pixel Buffers
//!
//! An immutable snapshot of a display's framebuffer in packed rgb24.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A 24-bit RGB colour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A buffer or target size that cannot be rendered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid dimensions {width}x{height}: {reason}")]
pub struct InvalidDimensions {
    pub width: u32,
    pub height: u32,
    pub reason: &'static str,
}

/// Immutable snapshot of `width × height` RGB pixels
///
/// The pixel data is shared, so cloning a buffer to hand it from a capture
/// thread to the renderer does not copy the frame.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
    sequence: u64,
    captured_at: Instant,
}

impl PixelBuffer {
    /// Wrap packed rgb24 data, checking that its length matches the dimensions
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, InvalidDimensions> {
        if width == 0 || height == 0 {
            return Err(InvalidDimensions {
                width,
                height,
                reason: "buffer has no pixels",
            });
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(InvalidDimensions {
                width,
                height,
                reason: "data length does not match width * height * 3",
            });
        }
        Ok(Self {
            width,
            height,
            data: data.into(),
            sequence: 0,
            captured_at: Instant::now(),
        })
    }

    /// Build a buffer by evaluating `pixel(x, y)` for every position
    pub fn from_fn(
        width: u32,
        height: u32,
        mut pixel: impl FnMut(u32, u32) -> Rgb,
    ) -> Result<Self, InvalidDimensions> {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let c = pixel(x, y);
                data.extend_from_slice(&[c.r, c.g, c.b]);
            }
        }
        Self::new(width, height, data)
    }

    /// Tag the buffer with the capture sequence number of its source
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Raw rgb24 bytes, row-major
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Colour at `(x, y)`. Callers stay inside `width × height`.
    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        debug_assert!(x < self.width && y < self.height);
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Rgb::new(self.data[i], self.data[i + 1], self.data[i + 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_rejects_bad_length() {
        let err = PixelBuffer::new(2, 2, vec![0; 11]).unwrap_err();
        assert_eq!(err.width, 2);
        assert_eq!(err.height, 2);

        assert!(PixelBuffer::new(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn test_buffer_pixel_lookup() {
        let buffer =
            PixelBuffer::from_fn(3, 2, |x, y| Rgb::new(x as u8, y as u8, 7)).unwrap();
        assert_eq!(buffer.pixel(0, 0), Rgb::new(0, 0, 7));
        assert_eq!(buffer.pixel(2, 1), Rgb::new(2, 1, 7));
        assert_eq!(buffer.as_bytes().len(), 18);
    }

    #[test]
    fn test_clone_shares_data() {
        let buffer = PixelBuffer::new(1, 1, vec![1, 2, 3]).unwrap().with_sequence(9);
        let copy = buffer.clone();
        assert_eq!(copy.sequence(), 9);
        assert!(std::ptr::eq(buffer.as_bytes(), copy.as_bytes()));
    }
}
