//! Extraction configuration.
//!
//! [`ExtractorOptions`] is a builder that carries the tick rate, encoder
//! quality, output format and size, and the re-registration policy through
//! the registry to every extractor it creates.
//!
//! # Example
//!
//! ```
//! use frametap::{ExtractorOptions, ImageFormat, ReregisterPolicy};
//!
//! let options = ExtractorOptions::new()
//!     .with_frames_per_second(30.0)
//!     .with_quality(0.6)
//!     .with_image_format(ImageFormat::Jpeg)
//!     .with_resolution(Some(640), None)
//!     .with_reregister_policy(ReregisterPolicy::Reject);
//!
//! assert_eq!(options.frames_per_second(), 30.0);
//! ```
//!
//! Options can also be loaded from JSON; missing keys take their defaults and
//! out-of-range values are clamped exactly as the builder clamps them:
//!
//! ```
//! use frametap::ExtractorOptions;
//!
//! let options = ExtractorOptions::from_json(r#"{ "quality": 1.5, "frames_per_second": 24 }"#)?;
//! assert_eq!(options.quality(), 1.0);
//! # Ok::<(), serde_json::Error>(())
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::encoder::ImageFormat;

/// Tick rate used when none is configured.
pub const DEFAULT_FRAMES_PER_SECOND: f64 = 60.0;

/// Encoder quality used when none is configured.
pub const DEFAULT_QUALITY: f32 = 0.8;

/// Highest tick rate the builder accepts.
pub const MAX_FRAMES_PER_SECOND: f64 = 240.0;

/// What the registry does when a handle that is already active is registered
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReregisterPolicy {
    /// Stop the old extractor, then start a new one bound to the new source.
    #[default]
    Replace,
    /// Fail with [`FrameTapError::AlreadyRegistered`](crate::FrameTapError::AlreadyRegistered)
    /// and leave the running extractor untouched.
    Reject,
}

/// Output size settings for encoded frames.
///
/// When no dimensions are set the source resolution is used. Setting one
/// dimension together with
/// [`maintain_aspect_ratio`](FrameOutputOptions::maintain_aspect_ratio)
/// computes the other dimension automatically.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FrameOutputOptions {
    /// Target width. `None` keeps the source width.
    pub width: Option<u32>,
    /// Target height. `None` keeps the source height.
    pub height: Option<u32>,
    /// When `true` and only one dimension is specified, the other is
    /// computed to preserve the source aspect ratio.
    pub maintain_aspect_ratio: bool,
}

impl Default for FrameOutputOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            maintain_aspect_ratio: true,
        }
    }
}

impl FrameOutputOptions {
    /// Resolve the final output dimensions given the source size.
    ///
    /// Returns `(width, height)`; neither side is ever zero for a non-empty
    /// source.
    pub fn resolve_dimensions(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        let width = self.width.filter(|&w| w > 0);
        let height = self.height.filter(|&h| h > 0);
        match (width, height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) if self.maintain_aspect_ratio && source_width > 0 => {
                let ratio = w as f64 / source_width as f64;
                let h = (source_height as f64 * ratio).round() as u32;
                (w, h.max(1))
            }
            (Some(w), None) => (w, source_height),
            (None, Some(h)) if self.maintain_aspect_ratio && source_height > 0 => {
                let ratio = h as f64 / source_height as f64;
                let w = (source_width as f64 * ratio).round() as u32;
                (w.max(1), h)
            }
            (None, Some(h)) => (source_width, h),
            (None, None) => (source_width, source_height),
        }
    }

    /// Whether frames are encoded at their source size.
    pub fn is_passthrough(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }
}

/// Settings applied to every extractor a registry creates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtractorOptions {
    frames_per_second: f64,
    quality: f32,
    image_format: ImageFormat,
    output: FrameOutputOptions,
    reregister: ReregisterPolicy,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorOptions {
    /// Create options with the defaults: 60 ticks per second, quality 0.8,
    /// JPEG at source resolution, replace on re-registration.
    pub fn new() -> Self {
        Self {
            frames_per_second: DEFAULT_FRAMES_PER_SECOND,
            quality: DEFAULT_QUALITY,
            image_format: ImageFormat::Jpeg,
            output: FrameOutputOptions::default(),
            reregister: ReregisterPolicy::Replace,
        }
    }

    /// Parse options from JSON, clamping out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let parsed: Self = serde_json::from_str(json)?;
        Ok(parsed.sanitized())
    }

    fn sanitized(self) -> Self {
        let frames_per_second = self.frames_per_second;
        let quality = self.quality;
        self.with_frames_per_second(frames_per_second)
            .with_quality(quality)
    }

    /// Set the tick rate.
    ///
    /// Clamped to `(0, 240]`; non-finite or non-positive values fall back to
    /// the default.
    #[must_use]
    pub fn with_frames_per_second(mut self, frames_per_second: f64) -> Self {
        self.frames_per_second = if frames_per_second.is_finite() && frames_per_second > 0.0 {
            frames_per_second.min(MAX_FRAMES_PER_SECOND)
        } else {
            DEFAULT_FRAMES_PER_SECOND
        };
        self
    }

    /// Set the lossy-compression quality, clamped to `0.0..=1.0`. NaN falls
    /// back to the default.
    #[must_use]
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = clamp_quality(quality);
        self
    }

    /// Set the compressed image format.
    #[must_use]
    pub fn with_image_format(mut self, format: ImageFormat) -> Self {
        self.image_format = format;
        self
    }

    /// Set a custom output resolution.
    ///
    /// Pass `None` for either dimension to keep the source value.
    #[must_use]
    pub fn with_resolution(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.output.width = width;
        self.output.height = height;
        self
    }

    /// Control whether aspect ratio is preserved when only one output
    /// dimension is specified. Defaults to `true`.
    #[must_use]
    pub fn with_maintain_aspect_ratio(mut self, maintain: bool) -> Self {
        self.output.maintain_aspect_ratio = maintain;
        self
    }

    /// Set the complete output size configuration.
    #[must_use]
    pub fn with_frame_output(mut self, output: FrameOutputOptions) -> Self {
        self.output = output;
        self
    }

    /// Choose what happens when an active handle is registered again.
    #[must_use]
    pub fn with_reregister_policy(mut self, policy: ReregisterPolicy) -> Self {
        self.reregister = policy;
        self
    }

    /// Configured tick rate.
    pub fn frames_per_second(&self) -> f64 {
        self.frames_per_second
    }

    /// Time between two ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frames_per_second)
    }

    /// Configured encoder quality.
    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// Configured image format.
    pub fn image_format(&self) -> ImageFormat {
        self.image_format
    }

    /// Configured output size.
    pub fn frame_output(&self) -> &FrameOutputOptions {
        &self.output
    }

    /// Configured re-registration policy.
    pub fn reregister_policy(&self) -> ReregisterPolicy {
        self.reregister
    }
}

/// Clamp a quality knob into `0.0..=1.0`, mapping NaN to the default.
pub(crate) fn clamp_quality(quality: f32) -> f32 {
    if quality.is_nan() {
        DEFAULT_QUALITY
    } else {
        quality.clamp(0.0, 1.0)
    }
}
