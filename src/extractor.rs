//! Per-session frame extraction.
//!
//! A [`FrameExtractor`] binds one [`FrameSource`] to an encoder and a
//! delivery sink. While running, a periodic tick asks the source whether a
//! new frame is ready at the current playback position and, if so, takes it,
//! encodes it, and pushes it to the sink. Pull requests encode whatever frame
//! is on screen without disturbing the tick's bookkeeping.
//!
//! ```text
//!           start()                 stop() / source ends / drop
//! Stopped ──────────▶ Running ─────────────────────────────────▶ Stopped
//! ```
//!
//! Tick, pull, and stop for one session are serialized by the extractor's
//! own lock; other sessions are never blocked. Once [`stop`](FrameExtractor::stop)
//! returns, no tick touches the source and nothing more reaches the sink.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use frametap::{
//!     ExtractorOptions, FrameEncoder, FrameEvent, FrameExtractor, ManualScheduler,
//!     PixelFormat, PlaybackSession, Position, SessionHandle, TestPattern, TickOutcome,
//! };
//!
//! let session = Arc::new(PlaybackSession::new());
//! let received = Arc::new(Mutex::new(Vec::new()));
//! let sink = {
//!     let received = Arc::clone(&received);
//!     Arc::new(move |event: FrameEvent| received.lock().unwrap().push(event))
//! };
//!
//! let extractor = FrameExtractor::new(
//!     SessionHandle(100),
//!     session.clone(),
//!     Arc::new(FrameEncoder::jpeg()),
//!     sink,
//!     &ExtractorOptions::new(),
//! );
//! extractor.start(&ManualScheduler::new())?;
//!
//! session.publish(Position::from_millis(0), TestPattern::new(16, 9).frame(0));
//! assert_eq!(extractor.tick(), TickOutcome::Delivered);
//! assert_eq!(extractor.tick(), TickOutcome::NoNewFrame);
//!
//! extractor.stop();
//! assert_eq!(received.lock().unwrap().len(), 1);
//! # Ok::<(), frametap::FrameTapError>(())
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::configuration::ExtractorOptions;
use crate::encoder::{EncodedFrame, ImageEncoder};
use crate::error::FrameTapError;
use crate::scheduler::{PeriodicScheduler, ScheduledTick, TickTask};
use crate::sink::{DeliverySink, FrameEvent};
use crate::source::{FrameSource, Position, SessionHandle};
use crate::stats::{ExtractionStats, StatsTracker};

/// Lifecycle state of a [`FrameExtractor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractorState {
    /// Not ticking; the source is not attached.
    Stopped,
    /// Ticking; the source is attached.
    Running,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickOutcome {
    /// The extractor was not running.
    Stopped,
    /// The source is gone; the extractor stopped itself.
    SourceLost,
    /// No frame newer than the last one was ready.
    NoNewFrame,
    /// A frame was encoded and handed to the sink.
    Delivered,
    /// A frame was taken but could not be encoded.
    Dropped,
}

struct Inner {
    state: ExtractorState,
    last_position: Option<Position>,
    tick: Option<Box<dyn ScheduledTick>>,
    stats: StatsTracker,
}

/// Extracts frames from one playback session.
pub struct FrameExtractor {
    handle: SessionHandle,
    source: Arc<dyn FrameSource>,
    encoder: Arc<dyn ImageEncoder>,
    sink: Arc<dyn DeliverySink>,
    quality: f32,
    interval: Duration,
    inner: Mutex<Inner>,
}

impl FrameExtractor {
    /// Create a stopped extractor.
    ///
    /// The tick interval and encoder quality come from `options`.
    pub fn new(
        handle: SessionHandle,
        source: Arc<dyn FrameSource>,
        encoder: Arc<dyn ImageEncoder>,
        sink: Arc<dyn DeliverySink>,
        options: &ExtractorOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            handle,
            source,
            encoder,
            sink,
            quality: options.quality(),
            interval: options.tick_interval(),
            inner: Mutex::new(Inner {
                state: ExtractorState::Stopped,
                last_position: None,
                tick: None,
                stats: StatsTracker::default(),
            }),
        })
    }

    /// Attach to the source and start ticking on `scheduler`.
    ///
    /// # Errors
    ///
    /// - [`FrameTapError::AlreadyRunning`] if the extractor is running.
    /// - [`FrameTapError::SourceUnavailable`] if the source has ended or
    ///   refuses the attach.
    /// - [`FrameTapError::Scheduler`] if the tick cannot be scheduled; the
    ///   source is detached again.
    pub fn start(self: &Arc<Self>, scheduler: &dyn PeriodicScheduler) -> Result<(), FrameTapError> {
        let mut inner = self.inner.lock();
        if inner.state == ExtractorState::Running {
            return Err(FrameTapError::AlreadyRunning(self.handle));
        }

        if !self.source.is_live() {
            return Err(FrameTapError::SourceUnavailable {
                handle: self.handle,
                reason: "playback session has ended".to_string(),
            });
        }
        self.source
            .attach()
            .map_err(|error| FrameTapError::SourceUnavailable {
                handle: self.handle,
                reason: error.to_string(),
            })?;

        let weak = Arc::downgrade(self);
        let task: TickTask = Arc::new(move || {
            if let Some(extractor) = weak.upgrade() {
                extractor.tick();
            }
        });

        let tick = match scheduler.schedule(self.interval, task) {
            Ok(tick) => tick,
            Err(error) => {
                self.release_source();
                return Err(error);
            }
        };

        inner.tick = Some(tick);
        inner.state = ExtractorState::Running;
        inner.last_position = None;
        inner.stats.started();
        log::debug!(
            "Started extractor for session {} (tick every {:?})",
            self.handle,
            self.interval
        );
        Ok(())
    }

    /// Cancel the tick and detach from the source.
    ///
    /// Idempotent. A detach failure is logged, never returned.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ExtractorState::Stopped {
            return;
        }
        self.halt(&mut inner);
        self.release_source();
        log::debug!("Stopped extractor for session {}", self.handle);
    }

    /// Run one extraction step.
    ///
    /// Normally called by the scheduler; hosts driving their own loop may
    /// call it directly.
    pub fn tick(&self) -> TickOutcome {
        let mut inner = self.inner.lock();
        if inner.state != ExtractorState::Running {
            return TickOutcome::Stopped;
        }
        inner.stats.tick();

        if !self.source.is_live() {
            log::debug!(
                "Playback session {} ended; stopping its extractor",
                self.handle
            );
            self.halt(&mut inner);
            if let Err(error) = self.source.detach() {
                log::debug!("Session {}: detach after end: {error}", self.handle);
            }
            return TickOutcome::SourceLost;
        }

        let position = self.source.current_position();
        if inner.last_position == Some(position) || !self.source.has_new_frame(position) {
            log::trace!("Session {}: no new frame at {}", self.handle, position);
            return TickOutcome::NoNewFrame;
        }

        let Some(buffer) = self.source.take_frame(position) else {
            return TickOutcome::NoNewFrame;
        };
        inner.last_position = Some(position);

        match self.encoder.encode(buffer, self.quality) {
            Ok(frame) => {
                inner.stats.delivered(position);
                self.sink.deliver(FrameEvent {
                    session: self.handle,
                    position,
                    frame,
                });
                TickOutcome::Delivered
            }
            Err(error) => {
                log::warn!(
                    "Session {}: dropping frame at {}: {}",
                    self.handle,
                    position,
                    error
                );
                inner.stats.dropped(position);
                TickOutcome::Dropped
            }
        }
    }

    /// Encode the frame currently on screen.
    ///
    /// Returns `None` when the extractor is stopped, the source has ended,
    /// no frame has been decoded yet, or the frame cannot be encoded (logged
    /// and counted as dropped). Does not affect which frame the next tick
    /// considers new.
    pub fn current_frame(&self) -> Option<EncodedFrame> {
        let mut inner = self.inner.lock();
        if inner.state != ExtractorState::Running || !self.source.is_live() {
            return None;
        }

        let position = self.source.current_position();
        let buffer = self.source.copy_frame(position)?;
        match self.encoder.encode(buffer, self.quality) {
            Ok(frame) => {
                inner.stats.pulled();
                Some(frame)
            }
            Err(error) => {
                log::warn!(
                    "Session {}: cannot serve frame at {}: {}",
                    self.handle,
                    position,
                    error
                );
                inner.stats.pull_dropped();
                None
            }
        }
    }

    /// The session this extractor reads from.
    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExtractorState {
        self.inner.lock().state
    }

    /// Whether the extractor is ticking.
    pub fn is_running(&self) -> bool {
        self.state() == ExtractorState::Running
    }

    /// Position of the last frame a tick took, if any since the last start.
    pub fn last_position(&self) -> Option<Position> {
        self.inner.lock().last_position
    }

    /// Time between two ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// A snapshot of this extractor's counters.
    pub fn stats(&self) -> ExtractionStats {
        self.inner.lock().stats.snapshot()
    }

    fn halt(&self, inner: &mut Inner) {
        inner.state = ExtractorState::Stopped;
        if let Some(tick) = inner.tick.take() {
            tick.cancel();
        }
        inner.stats.stopped();
    }

    fn release_source(&self) {
        if let Err(source) = self.source.detach() {
            let error = FrameTapError::ResourceTeardown {
                handle: self.handle,
                source,
            };
            log::warn!("{error}");
        }
    }
}

impl Drop for FrameExtractor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FrameExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameExtractor")
            .field("handle", &self.handle)
            .field("state", &self.state())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::encoder::FrameEncoder;
    use crate::error::SourceError;
    use crate::pattern::TestPattern;
    use crate::pixel::{PixelBuffer, PixelFormat};
    use crate::playback::PlaybackSession;
    use crate::scheduler::ManualScheduler;

    fn counting_sink() -> (Arc<AtomicUsize>, Arc<dyn DeliverySink>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let sink: Arc<dyn DeliverySink> = Arc::new(move |_event: FrameEvent| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, sink)
    }

    fn extractor(
        source: Arc<dyn FrameSource>,
        sink: Arc<dyn DeliverySink>,
    ) -> Arc<FrameExtractor> {
        FrameExtractor::new(
            SessionHandle(1),
            source,
            Arc::new(FrameEncoder::jpeg()),
            sink,
            &ExtractorOptions::new(),
        )
    }

    #[test]
    fn double_start_is_rejected() {
        let scheduler = ManualScheduler::new();
        let (_, sink) = counting_sink();
        let extractor = extractor(Arc::new(PlaybackSession::new()), sink);
        extractor.start(&scheduler).unwrap();
        assert!(matches!(
            extractor.start(&scheduler),
            Err(FrameTapError::AlreadyRunning(SessionHandle(1)))
        ));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn stalled_position_is_not_taken_twice() {
        let scheduler = ManualScheduler::new();
        let session = Arc::new(PlaybackSession::new());
        let (count, sink) = counting_sink();
        let extractor = extractor(session.clone(), sink);
        extractor.start(&scheduler).unwrap();

        let pattern = TestPattern::new(8, 8);
        session.publish(Position::from_millis(40), pattern.frame(0));
        assert_eq!(extractor.tick(), TickOutcome::Delivered);

        // A second frame at the same position (paused playback) is ignored.
        session.publish(Position::from_millis(40), pattern.frame(1));
        assert_eq!(extractor.tick(), TickOutcome::NoNewFrame);

        session.publish(Position::from_millis(80), pattern.frame(2));
        assert_eq!(extractor.tick(), TickOutcome::Delivered);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(extractor.last_position(), Some(Position::from_millis(80)));
    }

    #[test]
    fn corrupt_frame_is_dropped_and_not_retried() {
        let scheduler = ManualScheduler::new();
        let session = Arc::new(PlaybackSession::new());
        let (count, sink) = counting_sink();
        let extractor = extractor(session.clone(), sink);
        extractor.start(&scheduler).unwrap();

        let corrupt = PixelBuffer::packed(4, 4, PixelFormat::Bgra8, vec![0u8; 8]);
        session.publish(Position::from_millis(10), corrupt);
        assert_eq!(extractor.tick(), TickOutcome::Dropped);
        assert_eq!(extractor.tick(), TickOutcome::NoNewFrame);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(extractor.stats().frames_dropped, 1);
        assert!(extractor.is_running());
    }

    #[test]
    fn corrupt_frame_on_pull_is_none() {
        let scheduler = ManualScheduler::new();
        let session = Arc::new(PlaybackSession::new());
        let (count, sink) = counting_sink();
        let extractor = extractor(session.clone(), sink);
        extractor.start(&scheduler).unwrap();

        let corrupt = PixelBuffer::packed(4, 4, PixelFormat::Bgra8, vec![0u8; 8]);
        session.publish(Position::from_millis(10), corrupt);
        assert!(extractor.current_frame().is_none());

        let stats = extractor.stats();
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.pulls_served, 0);
        assert_eq!(stats.last_position, None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ended_source_stops_extractor() {
        let scheduler = ManualScheduler::new();
        let session = Arc::new(PlaybackSession::new());
        let (_, sink) = counting_sink();
        let extractor = extractor(session.clone(), sink);
        extractor.start(&scheduler).unwrap();

        session.end();
        assert_eq!(extractor.tick(), TickOutcome::SourceLost);
        assert_eq!(extractor.state(), ExtractorState::Stopped);
        assert!(scheduler.is_empty());
        assert_eq!(extractor.tick(), TickOutcome::Stopped);
    }

    #[test]
    fn pull_does_not_steal_tick_frame() {
        let scheduler = ManualScheduler::new();
        let session = Arc::new(PlaybackSession::new());
        let (count, sink) = counting_sink();
        let extractor = extractor(session.clone(), sink);
        extractor.start(&scheduler).unwrap();

        session.publish(Position::from_millis(5), TestPattern::new(6, 4).frame(0));
        let pulled = extractor.current_frame().unwrap();
        assert_eq!((pulled.width, pulled.height), (6, 4));

        assert_eq!(extractor.tick(), TickOutcome::Delivered);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(extractor.stats().pulls_served, 1);
    }

    #[test]
    fn stop_detaches_and_is_idempotent() {
        let scheduler = ManualScheduler::new();
        let session = Arc::new(PlaybackSession::new());
        let (_, sink) = counting_sink();
        let extractor = extractor(session.clone(), sink);
        extractor.start(&scheduler).unwrap();
        assert_eq!(session.attached_outputs(), 1);

        extractor.stop();
        extractor.stop();
        assert_eq!(session.attached_outputs(), 0);
        assert!(scheduler.is_empty());
        assert!(extractor.current_frame().is_none());
    }

    #[test]
    fn refused_attach_is_source_unavailable() {
        struct Refusing;
        impl FrameSource for Refusing {
            fn current_position(&self) -> Position {
                Position::ZERO
            }
            fn has_new_frame(&self, _at: Position) -> bool {
                false
            }
            fn take_frame(&self, _at: Position) -> Option<PixelBuffer> {
                None
            }
            fn attach(&self) -> Result<(), SourceError> {
                Err(SourceError::Other("no output slot".to_string()))
            }
        }

        let (_, sink) = counting_sink();
        let extractor = extractor(Arc::new(Refusing), sink);
        let error = extractor.start(&ManualScheduler::new()).unwrap_err();
        assert!(matches!(error, FrameTapError::SourceUnavailable { .. }));
        assert!(!extractor.is_running());
    }

    #[test]
    fn dropping_running_extractor_stops_it() {
        let scheduler = ManualScheduler::new();
        let session = Arc::new(PlaybackSession::new());
        let (_, sink) = counting_sink();
        let extractor = extractor(session.clone(), sink);
        extractor.start(&scheduler).unwrap();
        drop(extractor);

        assert_eq!(session.attached_outputs(), 0);
        assert!(scheduler.is_empty());
    }
}
