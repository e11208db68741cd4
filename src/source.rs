//! The playback side of the pipeline.
//!
//! [`FrameSource`] is everything the extractor needs from a live playback
//! session: where playback is, whether a new decoded frame is waiting, and
//! the frame itself. [`SourceResolver`] is the capability a host exposes to
//! turn a [`SessionHandle`] into a live source.
//!
//! Every method is a non-blocking lookup against state the decoder has
//! already produced. If nothing has been decoded yet the answer is "no frame",
//! never a wait.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::pixel::PixelBuffer;

/// Opaque identifier of one playback session, chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(pub i64);

impl SessionHandle {
    /// The raw identifier.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for SessionHandle {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for SessionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Playback position, measured from the start of the current item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Position(Duration);

impl Position {
    /// The start of the item.
    pub const ZERO: Position = Position(Duration::ZERO);

    /// Wrap a duration.
    pub fn new(offset: Duration) -> Self {
        Self(offset)
    }

    /// Position `millis` milliseconds into the item.
    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Offset from the start of the item.
    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl From<Duration> for Position {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

/// A live playback session the extractor can read frames from.
///
/// Implementations must be cheap and non-blocking: they are called from the
/// shared tick thread, and a slow call delays every other session on it.
pub trait FrameSource: Send + Sync {
    /// Where playback currently is.
    fn current_position(&self) -> Position;

    /// Whether a frame newer than the last one taken is ready for `at`.
    fn has_new_frame(&self, at: Position) -> bool;

    /// Take the frame ready for `at`, marking it as consumed.
    ///
    /// Returns `None` if no frame is ready (the decoder lost the race with
    /// the tick) or the session has been torn down.
    fn take_frame(&self, at: Position) -> Option<PixelBuffer>;

    /// Copy whatever frame is displayed at `at` without marking it consumed.
    ///
    /// Used by pull requests so they never steal a frame from the periodic
    /// tick. Defaults to [`take_frame`](Self::take_frame) for sources with no
    /// consumption bookkeeping.
    fn copy_frame(&self, at: Position) -> Option<PixelBuffer> {
        self.take_frame(at)
    }

    /// Attach an output to the session before the first tick.
    fn attach(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Release whatever [`attach`](Self::attach) set up.
    fn detach(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Whether the session still exists.
    fn is_live(&self) -> bool {
        true
    }
}

/// Resolves a session handle to its live playback source.
///
/// This is the documented capability a host must provide; the crate never
/// inspects a player's internals to find a session.
pub trait SourceResolver: Send + Sync {
    /// The live source for `handle`, or `None` if the session is not ready or
    /// has already ended.
    fn resolve(&self, handle: SessionHandle) -> Option<Arc<dyn FrameSource>>;
}

impl<F> SourceResolver for F
where
    F: Fn(SessionHandle) -> Option<Arc<dyn FrameSource>> + Send + Sync,
{
    fn resolve(&self, handle: SessionHandle) -> Option<Arc<dyn FrameSource>> {
        self(handle)
    }
}
