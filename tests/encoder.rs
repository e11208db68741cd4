//! FrameEncoder integration tests.
//!
//! Every encoded frame is decoded back with the `image` crate to check that
//! the output is a valid image of the expected size.

use frametap::{
    EncodeError, FrameEncoder, FrameOutputOptions, ImageEncoder, ImageFormat, PixelBuffer,
    PixelFormat, Plane, TestPattern,
};

fn decode(data: &[u8]) -> image::DynamicImage {
    image::load_from_memory(data).expect("Encoded bytes should decode")
}

// ── Dimensions ───────────────────────────────────────────────────

#[test]
fn jpeg_preserves_dimensions_for_every_format() {
    let sizes = [(1, 1), (2, 2), (3, 5), (17, 9), (64, 36)];
    let buffers = |width: u32, height: u32| {
        let pixels = (width * height) as usize;
        vec![
            PixelBuffer::packed(width, height, PixelFormat::Bgra8, vec![90u8; pixels * 4]),
            PixelBuffer::packed(width, height, PixelFormat::Rgba8, vec![90u8; pixels * 4]),
            PixelBuffer::packed(width, height, PixelFormat::Rgb8, vec![90u8; pixels * 3]),
            PixelBuffer::packed(width, height, PixelFormat::Gray8, vec![90u8; pixels]),
            TestPattern::new(width, height).with_format(PixelFormat::Nv12).frame(0),
        ]
    };

    for (width, height) in sizes {
        for buffer in buffers(width, height) {
            let format = buffer.format();
            let frame = FrameEncoder::jpeg()
                .encode(buffer, 0.8)
                .unwrap_or_else(|error| panic!("{format} {width}x{height}: {error}"));
            assert_eq!((frame.width, frame.height), (width, height));
            assert_eq!(frame.format, ImageFormat::Jpeg);

            let decoded = decode(&frame.data);
            assert_eq!(
                (decoded.width(), decoded.height()),
                (width, height),
                "{format} {width}x{height}"
            );
        }
    }
}

#[test]
fn odd_sized_nv12_encodes() {
    let buffer = TestPattern::new(641, 361).with_format(PixelFormat::Nv12).frame(5);
    let frame = FrameEncoder::png().encode(buffer, 0.5).expect("NV12 should encode");
    let decoded = decode(&frame.data);
    assert_eq!((decoded.width(), decoded.height()), (641, 361));
}

#[test]
fn output_signatures() {
    let buffer = TestPattern::new(8, 8).frame(0);
    let jpeg = FrameEncoder::jpeg().encode(buffer.clone(), 0.8).unwrap();
    assert!(jpeg.data.starts_with(&[0xFF, 0xD8, 0xFF]));

    let png = FrameEncoder::png().encode(buffer, 0.8).unwrap();
    assert!(png.data.starts_with(&[0x89, b'P', b'N', b'G']));
    assert_eq!(png.format, ImageFormat::Png);
}

// ── Pixel fidelity ───────────────────────────────────────────────

#[test]
fn png_is_lossless_and_swizzles_bgra() {
    // Two pixels: pure blue and half-transparent red, in BGRA order.
    let buffer = PixelBuffer::packed(2, 1, PixelFormat::Bgra8, vec![255, 0, 0, 255, 0, 0, 255, 128]);
    let frame = FrameEncoder::png().encode(buffer, 1.0).unwrap();
    let rgba = decode(&frame.data).to_rgba8();
    assert_eq!(rgba.as_raw(), &vec![0, 0, 255, 255, 255, 0, 0, 128]);
}

#[test]
fn stride_padding_does_not_change_the_image() {
    let (width, height) = (5u32, 3u32);
    let row = width as usize * 4;
    let packed: Vec<u8> = (0..row * height as usize).map(|i| (i * 7 % 251) as u8).collect();

    let stride = row + 12;
    let mut padded = vec![0xABu8; stride * height as usize];
    for y in 0..height as usize {
        padded[y * stride..y * stride + row].copy_from_slice(&packed[y * row..(y + 1) * row]);
    }

    let tight = PixelBuffer::packed(width, height, PixelFormat::Rgba8, packed);
    let loose =
        PixelBuffer::from_planes(width, height, PixelFormat::Rgba8, vec![Plane::new(padded, stride)]);

    let encoder = FrameEncoder::png();
    let tight = decode(&encoder.encode(tight, 1.0).unwrap().data).to_rgba8();
    let loose = decode(&encoder.encode(loose, 1.0).unwrap().data).to_rgba8();
    assert_eq!(tight, loose);
}

#[test]
fn lower_quality_gives_smaller_jpeg() {
    let buffer = TestPattern::new(128, 128).frame(3);
    let encoder = FrameEncoder::jpeg();
    let low = encoder.encode(buffer.clone(), 0.1).unwrap();
    let high = encoder.encode(buffer, 1.0).unwrap();
    assert!(low.len() < high.len(), "{} >= {}", low.len(), high.len());
}

#[test]
fn out_of_range_quality_is_clamped() {
    let buffer = TestPattern::new(16, 16).frame(0);
    let encoder = FrameEncoder::jpeg();
    assert!(encoder.encode(buffer.clone(), -3.0).is_ok());
    assert!(encoder.encode(buffer.clone(), 42.0).is_ok());
    assert!(encoder.encode(buffer, f32::NAN).is_ok());
}

// ── Scaling ──────────────────────────────────────────────────────

#[test]
fn output_width_keeps_aspect_ratio() {
    let encoder = FrameEncoder::jpeg().with_output(FrameOutputOptions {
        width: Some(32),
        ..FrameOutputOptions::default()
    });
    let frame = encoder.encode(TestPattern::new(64, 48).frame(0), 0.8).unwrap();
    assert_eq!((frame.width, frame.height), (32, 24));

    let decoded = decode(&frame.data);
    assert_eq!((decoded.width(), decoded.height()), (32, 24));
}

#[test]
fn explicit_output_size_is_exact() {
    let encoder = FrameEncoder::png().with_output(FrameOutputOptions {
        width: Some(10),
        height: Some(30),
        maintain_aspect_ratio: true,
    });
    let frame = encoder.encode(TestPattern::new(64, 48).frame(0), 0.8).unwrap();
    assert_eq!((frame.width, frame.height), (10, 30));
}

// ── Errors ───────────────────────────────────────────────────────

#[test]
fn zero_area_buffer_is_rejected() {
    let buffer = PixelBuffer::packed(0, 0, PixelFormat::Bgra8, Vec::new());
    let error = FrameEncoder::jpeg().encode(buffer, 0.8).unwrap_err();
    assert!(matches!(error, EncodeError::ZeroArea { width: 0, height: 0 }));
}

#[test]
fn unknown_pixel_format_is_rejected() {
    let fourcc = u32::from_be_bytes(*b"v210");
    let buffer = PixelBuffer::packed(4, 4, PixelFormat::Unknown(fourcc), vec![0u8; 64]);
    let error = FrameEncoder::png().encode(buffer, 0.8).unwrap_err();
    assert!(matches!(error, EncodeError::UnsupportedFormat(PixelFormat::Unknown(_))));
    assert!(error.to_string().contains("v210"));
}

#[test]
fn truncated_plane_is_rejected() {
    let buffer = PixelBuffer::packed(10, 10, PixelFormat::Rgb8, vec![0u8; 10]);
    let error = FrameEncoder::jpeg().encode(buffer, 0.8).unwrap_err();
    assert!(matches!(error, EncodeError::PlaneTooSmall { plane: 0, .. }));
}

#[test]
fn huge_stride_is_rejected_without_panicking() {
    let buffer = PixelBuffer::from_planes(
        2,
        3,
        PixelFormat::Rgb8,
        vec![Plane::new(vec![0u8; 64], usize::MAX / 2 + 1)],
    );
    let error = FrameEncoder::jpeg().encode(buffer, 0.8).unwrap_err();
    assert!(matches!(error, EncodeError::PlaneTooSmall { plane: 0, actual: 64, .. }));
}

// ── Output files ─────────────────────────────────────────────────

#[test]
fn encoded_frame_round_trips_through_a_file() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = temporary_directory.path().join("frame.png");

    let frame = FrameEncoder::png()
        .encode(TestPattern::new(20, 10).frame(1), 0.5)
        .unwrap();
    std::fs::write(&path, &frame.data).expect("Failed to write frame");

    let reopened = image::open(&path).expect("Saved frame should open");
    assert_eq!((reopened.width(), reopened.height()), (20, 10));
}
