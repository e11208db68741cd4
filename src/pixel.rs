//! Decoded, uncompressed frame data.
//!
//! A [`PixelBuffer`] is what a [`FrameSource`](crate::FrameSource) hands to
//! the encoder: dimensions, a [`PixelFormat`] tag, and one or more sample
//! [`Plane`]s. Plane bytes live behind an [`Arc`] so a source can keep the
//! latest frame for later pulls while the encoder consumes a clone.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::error::EncodeError;

/// Layout of the samples in a [`PixelBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Packed 8-bit B, G, R, A (32 bpp). The usual decoder output, and the
    /// default.
    #[default]
    Bgra8,
    /// Packed 8-bit R, G, B, A (32 bpp).
    Rgba8,
    /// Packed 8-bit R, G, B (24 bpp).
    Rgb8,
    /// 8-bit luma only.
    Gray8,
    /// Bi-planar 4:2:0: a full-resolution Y plane followed by a half-resolution
    /// interleaved CbCr plane. Video range, BT.601 coefficients.
    Nv12,
    /// A format the decoder produced that this crate cannot convert,
    /// identified by its FourCC.
    Unknown(u32),
}

impl PixelFormat {
    /// Bytes per pixel for packed formats, `None` for planar or unknown ones.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => Some(4),
            PixelFormat::Rgb8 => Some(3),
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Nv12 | PixelFormat::Unknown(_) => None,
        }
    }

    /// Whether the encoder knows how to convert this format.
    pub fn is_supported(self) -> bool {
        !matches!(self, PixelFormat::Unknown(_))
    }

    /// Minimum `(row_bytes, rows)` for every plane of a `width` × `height`
    /// buffer, or `None` for unsupported formats.
    pub(crate) fn plane_geometry(self, width: u32, height: u32) -> Option<Vec<(usize, usize)>> {
        let width = width as usize;
        let height = height as usize;
        match self {
            PixelFormat::Nv12 => {
                let chroma_rows = height.div_ceil(2);
                let chroma_row_bytes = width.div_ceil(2) * 2;
                Some(vec![(width, height), (chroma_row_bytes, chroma_rows)])
            }
            PixelFormat::Unknown(_) => None,
            packed => packed
                .bytes_per_pixel()
                .map(|bytes| vec![(width.saturating_mul(bytes), height)]),
        }
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PixelFormat::Bgra8 => write!(f, "BGRA8"),
            PixelFormat::Rgba8 => write!(f, "RGBA8"),
            PixelFormat::Rgb8 => write!(f, "RGB8"),
            PixelFormat::Gray8 => write!(f, "GRAY8"),
            PixelFormat::Nv12 => write!(f, "NV12"),
            PixelFormat::Unknown(fourcc) => {
                let bytes = fourcc.to_be_bytes();
                if bytes.iter().all(|byte| byte.is_ascii_graphic() || *byte == b' ') {
                    write!(f, "unknown '{}'", String::from_utf8_lossy(&bytes))
                } else {
                    write!(f, "unknown 0x{fourcc:08x}")
                }
            }
        }
    }
}

/// One plane of sample data.
#[derive(Debug, Clone)]
pub struct Plane {
    data: Arc<[u8]>,
    bytes_per_row: usize,
}

impl Plane {
    /// Wrap sample bytes with the given row stride.
    pub fn new(data: impl Into<Arc<[u8]>>, bytes_per_row: usize) -> Self {
        Self {
            data: data.into(),
            bytes_per_row,
        }
    }

    /// Raw sample bytes, including any row padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Row stride in bytes.
    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    /// Bytes of row `y`, `row_bytes` long, skipping stride padding.
    pub(crate) fn row(&self, y: usize, row_bytes: usize) -> &[u8] {
        let start = y * self.bytes_per_row;
        &self.data[start..start + row_bytes]
    }
}

/// A decoded video frame.
///
/// Construction never fails; geometry is checked by [`validate`](Self::validate),
/// which every encoder calls before touching the samples. This lets a source
/// report exactly what the decoder produced and leaves the verdict to the
/// encoder.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<Plane>,
}

impl PixelBuffer {
    /// Build a buffer from explicit planes.
    pub fn from_planes(width: u32, height: u32, format: PixelFormat, planes: Vec<Plane>) -> Self {
        Self {
            width,
            height,
            format,
            planes,
        }
    }

    /// Build a single-plane, tightly packed buffer.
    ///
    /// The stride is `width * bytes_per_pixel`; for formats without a fixed
    /// pixel size the stride is `width`.
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: impl Into<Arc<[u8]>>) -> Self {
        let bytes_per_pixel = format.bytes_per_pixel().unwrap_or(1);
        let bytes_per_row = (width as usize).saturating_mul(bytes_per_pixel);
        Self::from_planes(width, height, format, vec![Plane::new(data, bytes_per_row)])
    }

    /// Build a tightly packed NV12 buffer from its Y and interleaved CbCr planes.
    pub fn nv12(
        width: u32,
        height: u32,
        luma: impl Into<Arc<[u8]>>,
        chroma: impl Into<Arc<[u8]>>,
    ) -> Self {
        let luma_stride = width as usize;
        let chroma_stride = (width as usize).div_ceil(2) * 2;
        Self::from_planes(
            width,
            height,
            PixelFormat::Nv12,
            vec![
                Plane::new(luma, luma_stride),
                Plane::new(chroma, chroma_stride),
            ],
        )
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sample layout.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Sample planes.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Check that the buffer can be encoded.
    ///
    /// # Errors
    ///
    /// [`EncodeError::ZeroArea`] when either dimension is zero,
    /// [`EncodeError::UnsupportedFormat`] for [`PixelFormat::Unknown`], and
    /// plane count / stride / length errors when the planes do not match the
    /// declared geometry.
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::ZeroArea {
                width: self.width,
                height: self.height,
            });
        }

        let geometry = self
            .format
            .plane_geometry(self.width, self.height)
            .ok_or(EncodeError::UnsupportedFormat(self.format))?;

        if geometry.len() != self.planes.len() {
            return Err(EncodeError::PlaneCount {
                expected: geometry.len(),
                actual: self.planes.len(),
            });
        }

        for (index, (plane, (row_bytes, rows))) in self.planes.iter().zip(geometry).enumerate() {
            if plane.bytes_per_row < row_bytes {
                return Err(EncodeError::StrideTooSmall {
                    plane: index,
                    stride: plane.bytes_per_row,
                    minimum: row_bytes,
                });
            }
            // The last row does not need trailing padding. A span that
            // overflows can never fit in memory.
            let expected = plane
                .bytes_per_row
                .checked_mul(rows - 1)
                .and_then(|span| span.checked_add(row_bytes))
                .unwrap_or(usize::MAX);
            if plane.data.len() < expected {
                return Err(EncodeError::PlaneTooSmall {
                    plane: index,
                    expected,
                    actual: plane.data.len(),
                });
            }
        }

        Ok(())
    }
}
