//! Per-extractor counters.
//!
//! Every extractor keeps a [`StatsTracker`] under its own lock and hands out
//! [`ExtractionStats`] snapshots on request.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use frametap::{
//!     EventChannel, ExtractorOptions, FrameExtractor, FrameEncoder, ManualScheduler,
//!     PlaybackSession, SessionHandle,
//! };
//!
//! let session = Arc::new(PlaybackSession::new());
//! let extractor = FrameExtractor::new(
//!     SessionHandle(1),
//!     session,
//!     Arc::new(FrameEncoder::jpeg()),
//!     Arc::new(EventChannel::new()),
//!     &ExtractorOptions::new(),
//! );
//! extractor.start(&ManualScheduler::new())?;
//! extractor.tick();
//!
//! let stats = extractor.stats();
//! assert_eq!(stats.ticks, 1);
//! assert_eq!(stats.frames_delivered, 0);
//! # Ok::<(), frametap::FrameTapError>(())
//! ```

use std::time::{Duration, Instant};

use crate::source::Position;

/// A snapshot of one extractor's activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionStats {
    /// Ticks that ran while the extractor was running.
    pub ticks: u64,
    /// Frames encoded and handed to the sink.
    pub frames_delivered: u64,
    /// Frames dropped because encoding failed, on a tick or a pull.
    pub frames_dropped: u64,
    /// Pull requests that returned a frame.
    pub pulls_served: u64,
    /// Playback position of the last frame taken by a tick.
    pub last_position: Option<Position>,
    /// Time spent in the running state, summed over every start/stop cycle.
    pub running_time: Duration,
    /// Frames delivered per second of running time, if any time has passed.
    pub delivery_rate: Option<f64>,
}

/// Accumulates counters for one extractor.
#[derive(Debug, Default)]
pub(crate) struct StatsTracker {
    ticks: u64,
    delivered: u64,
    dropped: u64,
    pulls: u64,
    last_position: Option<Position>,
    accumulated: Duration,
    started_at: Option<Instant>,
}

impl StatsTracker {
    pub(crate) fn started(&mut self) {
        self.started_at.get_or_insert_with(Instant::now);
    }

    pub(crate) fn stopped(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            self.accumulated += started_at.elapsed();
        }
    }

    pub(crate) fn tick(&mut self) {
        self.ticks += 1;
    }

    pub(crate) fn delivered(&mut self, position: Position) {
        self.delivered += 1;
        self.last_position = Some(position);
    }

    pub(crate) fn dropped(&mut self, position: Position) {
        self.dropped += 1;
        self.last_position = Some(position);
    }

    pub(crate) fn pulled(&mut self) {
        self.pulls += 1;
    }

    pub(crate) fn pull_dropped(&mut self) {
        self.dropped += 1;
    }

    pub(crate) fn snapshot(&self) -> ExtractionStats {
        let running_time = self.accumulated
            + self
                .started_at
                .map(|started_at| started_at.elapsed())
                .unwrap_or_default();

        let delivery_rate = Some(running_time.as_secs_f64())
            .filter(|&seconds| seconds > 0.0)
            .map(|seconds| self.delivered as f64 / seconds);

        ExtractionStats {
            ticks: self.ticks,
            frames_delivered: self.delivered,
            frames_dropped: self.dropped,
            pulls_served: self.pulls,
            last_position: self.last_position,
            running_time,
            delivery_rate,
        }
    }
}
