//! Synthetic frames for demos, tests, and benchmarks.

use crate::pixel::{PixelBuffer, PixelFormat};

/// Generates a moving colour gradient.
///
/// Frame `index` shifts the gradient by `index` pixels, so consecutive
/// frames differ and a consumer can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPattern {
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl TestPattern {
    /// A BGRA pattern of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Bgra8,
        }
    }

    /// Produce frames in `format` instead. Only [`PixelFormat::Bgra8`],
    /// [`PixelFormat::Rgba8`] and [`PixelFormat::Nv12`] are generated; any
    /// other format falls back to BGRA.
    #[must_use]
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = match format {
            PixelFormat::Rgba8 | PixelFormat::Nv12 => format,
            _ => PixelFormat::Bgra8,
        };
        self
    }

    /// Frame width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The format frames are produced in.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Render frame number `index`.
    pub fn frame(&self, index: u64) -> PixelBuffer {
        match self.format {
            PixelFormat::Nv12 => self.nv12(index),
            format => self.packed(index, format),
        }
    }

    fn shade(&self, x: u32, y: u32, index: u64) -> (u8, u8, u8) {
        let shifted = (u64::from(x) + index) % u64::from(self.width.max(1));
        let r = (shifted * 255 / u64::from(self.width.max(1))) as u8;
        let g = (u64::from(y) * 255 / u64::from(self.height.max(1))) as u8;
        let b = (index % 256) as u8;
        (r, g, b)
    }

    fn packed(&self, index: u64, format: PixelFormat) -> PixelBuffer {
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                let (r, g, b) = self.shade(x, y, index);
                match format {
                    PixelFormat::Rgba8 => data.extend_from_slice(&[r, g, b, u8::MAX]),
                    _ => data.extend_from_slice(&[b, g, r, u8::MAX]),
                }
            }
        }
        PixelBuffer::packed(self.width, self.height, format, data)
    }

    fn nv12(&self, index: u64) -> PixelBuffer {
        let (width, height) = (self.width as usize, self.height as usize);
        let mut luma = Vec::with_capacity(width * height);
        for y in 0..self.height {
            for x in 0..self.width {
                let (r, g, b) = self.shade(x, y, index);
                luma.push(video_luma(r, g, b));
            }
        }

        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);
        let mut chroma = Vec::with_capacity(chroma_width * 2 * chroma_height);
        for cy in 0..chroma_height as u32 {
            for cx in 0..chroma_width as u32 {
                let (r, g, b) = self.shade(cx * 2, cy * 2, index);
                let (cb, cr) = video_chroma(r, g, b);
                chroma.push(cb);
                chroma.push(cr);
            }
        }

        PixelBuffer::nv12(self.width, self.height, luma, chroma)
    }
}

fn video_luma(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

fn video_chroma(r: u8, g: u8, b: u8) -> (u8, u8) {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let cb = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let cr = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (cb.clamp(0, 255) as u8, cr.clamp(0, 255) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_validate_in_every_format() {
        for format in [PixelFormat::Bgra8, PixelFormat::Rgba8, PixelFormat::Nv12] {
            let pattern = TestPattern::new(7, 5).with_format(format);
            let frame = pattern.frame(3);
            assert_eq!(frame.format(), format);
            assert!(frame.validate().is_ok(), "{format} frame should validate");
        }
    }

    #[test]
    fn consecutive_frames_differ() {
        let pattern = TestPattern::new(8, 8);
        let first = pattern.frame(0);
        let second = pattern.frame(1);
        assert_ne!(first.planes()[0].data(), second.planes()[0].data());
    }

    #[test]
    fn unsupported_format_falls_back_to_bgra() {
        let pattern = TestPattern::new(2, 2).with_format(PixelFormat::Gray8);
        assert_eq!(pattern.format(), PixelFormat::Bgra8);
    }
}
