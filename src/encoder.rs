//! Compression of decoded frames into still images.
//!
//! [`ImageEncoder`] is the seam the extractor encodes through;
//! [`FrameEncoder`] is the stock implementation on top of the `image` crate,
//! producing JPEG (the default) or PNG and optionally scaling the frame
//! first.
//!
//! # Example
//!
//! ```
//! use frametap::{FrameEncoder, ImageEncoder, PixelBuffer, PixelFormat};
//!
//! let buffer = PixelBuffer::packed(4, 2, PixelFormat::Bgra8, vec![0x80u8; 4 * 2 * 4]);
//! let frame = FrameEncoder::jpeg().encode(buffer, 0.8)?;
//!
//! assert_eq!((frame.width, frame.height), (4, 2));
//! assert!(frame.data.starts_with(&[0xFF, 0xD8]));
//! # Ok::<(), frametap::EncodeError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::error::{ParameterError, ParameterErrorKind};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageError, RgbImage, RgbaImage};
use image::ImageEncoder as _;
use serde::{Deserialize, Serialize};

use crate::configuration::{FrameOutputOptions, clamp_quality};
use crate::conversion::{to_rgb8, to_rgba8};
use crate::error::EncodeError;
use crate::pixel::PixelBuffer;

/// Compressed image container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Baseline JPEG. Lossy; alpha is dropped.
    #[default]
    Jpeg,
    /// PNG with alpha. Lossless; quality selects compression effort.
    Png,
}

impl ImageFormat {
    /// MIME type of the compressed bytes.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    /// Conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ImageFormat::Jpeg => write!(f, "JPEG"),
            ImageFormat::Png => write!(f, "PNG"),
        }
    }
}

/// A compressed frame, ready to hand to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Width of the encoded image in pixels.
    pub width: u32,
    /// Height of the encoded image in pixels.
    pub height: u32,
    /// Container of [`data`](Self::data).
    pub format: ImageFormat,
    /// Compressed bytes.
    pub data: Vec<u8>,
}

impl EncodedFrame {
    /// Size of the compressed bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the compressed payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Turns a decoded [`PixelBuffer`] into an [`EncodedFrame`].
///
/// Encoding is a pure function of its input: the same buffer and quality
/// always give an equivalent image. Implementations are shared across the
/// tick thread and pull callers, hence `Send + Sync`.
pub trait ImageEncoder: Send + Sync {
    /// Encode `buffer` at `quality` (0.0 – 1.0).
    ///
    /// # Errors
    ///
    /// Any [`EncodeError`]; the buffer is checked with
    /// [`PixelBuffer::validate`] before any sample is read.
    fn encode(&self, buffer: PixelBuffer, quality: f32) -> Result<EncodedFrame, EncodeError>;
}

/// The stock [`ImageEncoder`].
///
/// Quality is clamped to `0.0..=1.0`. For JPEG it maps to the 1 – 100 scale;
/// for PNG it picks the compression effort.
#[derive(Debug, Clone, Default)]
pub struct FrameEncoder {
    format: ImageFormat,
    output: FrameOutputOptions,
}

impl FrameEncoder {
    /// Encoder for `format` at source resolution.
    pub fn new(format: ImageFormat) -> Self {
        Self {
            format,
            output: FrameOutputOptions::default(),
        }
    }

    /// JPEG encoder at source resolution.
    pub fn jpeg() -> Self {
        Self::new(ImageFormat::Jpeg)
    }

    /// PNG encoder at source resolution.
    pub fn png() -> Self {
        Self::new(ImageFormat::Png)
    }

    /// Scale frames before compression.
    #[must_use]
    pub fn with_output(mut self, output: FrameOutputOptions) -> Self {
        self.output = output;
        self
    }

    /// The container this encoder produces.
    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

impl ImageEncoder for FrameEncoder {
    fn encode(&self, buffer: PixelBuffer, quality: f32) -> Result<EncodedFrame, EncodeError> {
        let quality = clamp_quality(quality);
        let (width, height) = (buffer.width(), buffer.height());

        let image = match self.format {
            ImageFormat::Jpeg => {
                let rgb = RgbImage::from_raw(width, height, to_rgb8(&buffer)?)
                    .ok_or_else(dimension_mismatch)?;
                DynamicImage::ImageRgb8(rgb)
            }
            ImageFormat::Png => {
                let rgba = RgbaImage::from_raw(width, height, to_rgba8(&buffer)?)
                    .ok_or_else(dimension_mismatch)?;
                DynamicImage::ImageRgba8(rgba)
            }
        };

        let (target_width, target_height) = self.output.resolve_dimensions(width, height);
        let image = if (target_width, target_height) != (width, height) {
            image.resize_exact(target_width, target_height, FilterType::Triangle)
        } else {
            image
        };

        let mut data = Vec::new();
        match self.format {
            ImageFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut data, jpeg_quality(quality)).write_image(
                    image.as_bytes(),
                    target_width,
                    target_height,
                    ExtendedColorType::Rgb8,
                )?;
            }
            ImageFormat::Png => {
                PngEncoder::new_with_quality(
                    &mut data,
                    png_compression(quality),
                    PngFilterType::Adaptive,
                )
                .write_image(
                    image.as_bytes(),
                    target_width,
                    target_height,
                    ExtendedColorType::Rgba8,
                )?;
            }
        }

        log::trace!(
            "Encoded {}x{} {} frame as {target_width}x{target_height} {} ({} bytes)",
            width,
            height,
            buffer.format(),
            self.format,
            data.len()
        );

        Ok(EncodedFrame {
            width: target_width,
            height: target_height,
            format: self.format,
            data,
        })
    }
}

/// Map `0.0..=1.0` onto the JPEG 1 – 100 scale.
fn jpeg_quality(quality: f32) -> u8 {
    ((quality * 100.0).round() as u8).clamp(1, 100)
}

fn png_compression(quality: f32) -> CompressionType {
    if quality < 0.34 {
        CompressionType::Fast
    } else if quality > 0.67 {
        CompressionType::Best
    } else {
        CompressionType::Default
    }
}

fn dimension_mismatch() -> EncodeError {
    EncodeError::Image(ImageError::Parameter(ParameterError::from_kind(
        ParameterErrorKind::DimensionMismatch,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(0.8), 80);
        assert_eq!(jpeg_quality(0.555), 56);
        assert_eq!(jpeg_quality(1.0), 100);
    }

    #[test]
    fn png_compression_mapping() {
        assert!(matches!(png_compression(0.1), CompressionType::Fast));
        assert!(matches!(png_compression(0.5), CompressionType::Default));
        assert!(matches!(png_compression(0.9), CompressionType::Best));
    }

    #[test]
    fn format_metadata() {
        assert_eq!(ImageFormat::default(), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::Png.mime_type(), "image/png");
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Png.to_string(), "PNG");
    }
}
