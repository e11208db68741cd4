//! Error types for the `frametap` crate.
//!
//! This module defines [`FrameTapError`], the unified error type returned by
//! registry, extractor, and scheduler operations, plus the narrower
//! [`EncodeError`] produced by image encoders and [`SourceError`] produced by
//! playback sources. Errors carry the session handle they concern so a caller
//! juggling many sessions can tell them apart without extra logging.

use std::io::Error as IoError;

use image::ImageError;
use thiserror::Error;

use crate::pixel::PixelFormat;
use crate::source::SessionHandle;

/// The unified error type for all `frametap` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameTapError {
    /// A request carried missing or malformed parameters.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The session handle is not present in the registry.
    #[error("Session {0} is not registered")]
    NotRegistered(SessionHandle),

    /// The session handle is already present and the registry is configured
    /// to reject re-registration.
    #[error("Session {0} is already registered")]
    AlreadyRegistered(SessionHandle),

    /// The playback session behind a handle could not be reached.
    #[error("Playback source for session {handle} is unavailable: {reason}")]
    SourceUnavailable {
        /// Handle the caller tried to register.
        handle: SessionHandle,
        /// Why the source could not be used.
        reason: String,
    },

    /// [`FrameExtractor::start`](crate::FrameExtractor::start) was called on
    /// an extractor that is already running.
    #[error("Extractor for session {0} is already running")]
    AlreadyRunning(SessionHandle),

    /// A frame could not be encoded.
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] EncodeError),

    /// Detaching from the playback source failed while stopping an extractor.
    ///
    /// Stop is best-effort cleanup, so this variant is logged rather than
    /// returned.
    #[error("Failed to release playback source for session {handle}: {source}")]
    ResourceTeardown {
        /// Session whose extractor was being stopped.
        handle: SessionHandle,
        /// What the source reported.
        source: SourceError,
    },

    /// The tick scheduler could not accept work.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// An I/O error occurred (spawning the scheduler thread, writing output).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

/// Errors produced while turning a [`PixelBuffer`](crate::PixelBuffer) into a
/// compressed image.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// Width or height is zero.
    #[error("Cannot encode a zero-area buffer ({width}x{height})")]
    ZeroArea {
        /// Buffer width in pixels.
        width: u32,
        /// Buffer height in pixels.
        height: u32,
    },

    /// The encoder has no conversion path for this pixel format.
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(PixelFormat),

    /// The buffer has the wrong number of planes for its format.
    #[error("Expected {expected} plane(s) for this pixel format, got {actual}")]
    PlaneCount {
        /// Planes the format requires.
        expected: usize,
        /// Planes the buffer carries.
        actual: usize,
    },

    /// A plane's row stride is narrower than one tightly packed row.
    #[error("Plane {plane} stride {stride} is smaller than the minimum row size {minimum}")]
    StrideTooSmall {
        /// Plane index.
        plane: usize,
        /// Declared bytes per row.
        stride: usize,
        /// Bytes one packed row needs.
        minimum: usize,
    },

    /// A plane holds fewer bytes than its geometry requires.
    #[error("Plane {plane} holds {actual} bytes, expected at least {expected}")]
    PlaneTooSmall {
        /// Plane index.
        plane: usize,
        /// Bytes the geometry requires.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },

    /// The compression backend failed.
    #[error("Image compression failed: {0}")]
    Image(#[from] ImageError),
}

/// Errors reported by a [`FrameSource`](crate::FrameSource) when the
/// extractor attaches to or detaches from it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SourceError {
    /// The playback session has already been torn down.
    #[error("playback session has ended")]
    Ended,

    /// Detach was requested without a matching attach.
    #[error("no output is attached to the playback session")]
    NotAttached,

    /// Any other source-specific failure.
    #[error("{0}")]
    Other(String),
}
