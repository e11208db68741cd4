//! Colour conversion from decoded planes to the packed layouts encoders take.
//!
//! Every conversion works row by row, reading each plane through its own
//! stride so decoder padding never leaks into the output. With the `rayon`
//! feature the rows are converted in parallel.

use crate::error::EncodeError;
use crate::pixel::{Plane, PixelBuffer, PixelFormat};

/// Convert a buffer into tightly packed 8-bit RGB.
pub(crate) fn to_rgb8(buffer: &PixelBuffer) -> Result<Vec<u8>, EncodeError> {
    convert(buffer, 3)
}

/// Convert a buffer into tightly packed 8-bit RGBA. Formats without alpha get
/// an opaque alpha channel.
pub(crate) fn to_rgba8(buffer: &PixelBuffer) -> Result<Vec<u8>, EncodeError> {
    convert(buffer, 4)
}

fn convert(buffer: &PixelBuffer, channels: usize) -> Result<Vec<u8>, EncodeError> {
    buffer.validate()?;

    let width = buffer.width() as usize;
    let height = buffer.height() as usize;
    let row_len = width * channels;

    match (buffer.format(), channels) {
        (PixelFormat::Rgb8, 3) | (PixelFormat::Rgba8, 4) => {
            return Ok(pack_rows(&buffer.planes()[0], row_len, height));
        }
        _ => {}
    }

    let mut output = vec![0u8; row_len * height];

    #[cfg(feature = "rayon")]
    {
        use ::rayon::iter::{IndexedParallelIterator, ParallelIterator};
        use ::rayon::slice::ParallelSliceMut;

        output
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| convert_row(buffer, y, channels, row));
    }

    #[cfg(not(feature = "rayon"))]
    for (y, row) in output.chunks_mut(row_len).enumerate() {
        convert_row(buffer, y, channels, row);
    }

    Ok(output)
}

/// Copy a plane into a tightly packed buffer, dropping stride padding.
fn pack_rows(plane: &Plane, row_bytes: usize, rows: usize) -> Vec<u8> {
    if plane.bytes_per_row() == row_bytes {
        plane.data()[..row_bytes * rows].to_vec()
    } else {
        let mut packed = Vec::with_capacity(row_bytes * rows);
        for y in 0..rows {
            packed.extend_from_slice(plane.row(y, row_bytes));
        }
        packed
    }
}

fn convert_row(buffer: &PixelBuffer, y: usize, channels: usize, out: &mut [u8]) {
    let width = buffer.width() as usize;
    let planes = buffer.planes();

    match buffer.format() {
        PixelFormat::Bgra8 => {
            let source = planes[0].row(y, width * 4);
            for (pixel, target) in source.chunks_exact(4).zip(out.chunks_exact_mut(channels)) {
                target[0] = pixel[2];
                target[1] = pixel[1];
                target[2] = pixel[0];
                if channels == 4 {
                    target[3] = pixel[3];
                }
            }
        }
        PixelFormat::Rgba8 => {
            let source = planes[0].row(y, width * 4);
            for (pixel, target) in source.chunks_exact(4).zip(out.chunks_exact_mut(channels)) {
                target.copy_from_slice(&pixel[..channels]);
            }
        }
        PixelFormat::Rgb8 => {
            let source = planes[0].row(y, width * 3);
            for (pixel, target) in source.chunks_exact(3).zip(out.chunks_exact_mut(channels)) {
                target[..3].copy_from_slice(pixel);
                if channels == 4 {
                    target[3] = u8::MAX;
                }
            }
        }
        PixelFormat::Gray8 => {
            let source = planes[0].row(y, width);
            for (&luma, target) in source.iter().zip(out.chunks_exact_mut(channels)) {
                target[..3].fill(luma);
                if channels == 4 {
                    target[3] = u8::MAX;
                }
            }
        }
        PixelFormat::Nv12 => {
            let luma = planes[0].row(y, width);
            let chroma = planes[1].row(y / 2, width.div_ceil(2) * 2);
            for (x, target) in out.chunks_exact_mut(channels).enumerate() {
                let pair = (x / 2) * 2;
                let rgb = bt601_video_to_rgb(luma[x], chroma[pair], chroma[pair + 1]);
                target[..3].copy_from_slice(&rgb);
                if channels == 4 {
                    target[3] = u8::MAX;
                }
            }
        }
        // Rejected by `PixelBuffer::validate`.
        PixelFormat::Unknown(_) => {}
    }
}

/// Fixed-point BT.601 video-range YCbCr to RGB.
fn bt601_video_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(cb) - 128;
    let e = i32::from(cr) - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    [clamp_channel(r), clamp_channel(g), clamp_channel(b)]
}

fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
