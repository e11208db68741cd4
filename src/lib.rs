//! # frametap
//!
//! Tap decoded frames out of live video playback sessions.
//!
//! `frametap` samples a playing video at a fixed cadence, compresses each new
//! decoded frame into a JPEG or PNG, and hands it to a consumer either on
//! request (pull) or as it arrives (push). Many sessions can be registered,
//! polled, and torn down independently, each identified by a caller-chosen
//! [`SessionHandle`].
//!
//! ## Quick Start
//!
//! ### Push frames from a playback session
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use frametap::{
//!     ExtractorOptions, FrameEvent, PlaybackSession, Position, SessionHandle,
//!     SessionRegistry, TestPattern, TickScheduler,
//! };
//!
//! let registry = SessionRegistry::new(
//!     Arc::new(TickScheduler::new()?),
//!     Arc::new(|event: FrameEvent| {
//!         println!("session {}: {} bytes", event.session, event.frame.len());
//!     }),
//!     ExtractorOptions::new().with_frames_per_second(30.0),
//! );
//!
//! let session = Arc::new(PlaybackSession::new());
//! registry.register(SessionHandle(1), session.clone())?;
//!
//! // The decoder publishes frames as playback advances.
//! let pattern = TestPattern::new(320, 180);
//! for index in 0..30u64 {
//!     session.publish(Position::from_millis(index * 33), pattern.frame(index));
//!     std::thread::sleep(std::time::Duration::from_millis(33));
//! }
//!
//! registry.unregister(SessionHandle(1))?;
//! # Ok::<(), frametap::FrameTapError>(())
//! ```
//!
//! ### Pull the frame on screen
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use frametap::{EventChannel, ExtractorOptions, PlaybackSession, SessionHandle,
//! #     SessionRegistry, TickScheduler};
//! # let registry = SessionRegistry::new(
//! #     Arc::new(TickScheduler::new()?),
//! #     Arc::new(EventChannel::new()),
//! #     ExtractorOptions::new(),
//! # );
//! # registry.register(SessionHandle(1), Arc::new(PlaybackSession::new()))?;
//! if let Some(frame) = registry.current_frame(SessionHandle(1))? {
//!     std::fs::write("frame.jpg", &frame.data)?;
//! }
//! # Ok::<(), frametap::FrameTapError>(())
//! ```
//!
//! ## Features
//!
//! - **Periodic extraction**: one tick thread drives every session; only
//!   frames newer than the last delivered one are encoded
//! - **Pull and push**: [`SessionRegistry::current_frame`] for the frame on
//!   screen, a [`DeliverySink`] for every new frame
//! - **Pixel formats**: BGRA, RGBA, RGB, grayscale, and NV12 with arbitrary
//!   row strides and odd dimensions
//! - **Output control**: JPEG or PNG, quality, and target resolution with
//!   aspect ratio preservation
//! - **Host channel**: [`FrameChannel`] maps method calls and events onto
//!   the registry with string error codes and a JSON envelope
//! - **Statistics**: per-session tick, delivery, drop, and pull counters
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | `FrameStream`, a `tokio_stream::Stream` of pushed frames |
//! | `rayon` | Colour conversion distributed across rayon threads |
//! | `full` | Enables all of the above |

pub mod channel;
pub mod configuration;
mod conversion;
pub mod encoder;
pub mod error;
pub mod extractor;
pub mod pattern;
pub mod pixel;
pub mod playback;
pub mod registry;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod stats;
#[cfg(feature = "async")]
pub mod stream;

pub use channel::{
    ChannelError, ErrorCode, FrameChannel, FramePayload, MethodCall, MethodResponse,
};
pub use configuration::{
    DEFAULT_FRAMES_PER_SECOND, DEFAULT_QUALITY, ExtractorOptions, FrameOutputOptions,
    ReregisterPolicy,
};
pub use encoder::{EncodedFrame, FrameEncoder, ImageEncoder, ImageFormat};
pub use error::{EncodeError, FrameTapError, SourceError};
pub use extractor::{ExtractorState, FrameExtractor, TickOutcome};
pub use pattern::TestPattern;
pub use pixel::{PixelBuffer, PixelFormat, Plane};
pub use playback::{PlaybackSession, SessionDirectory};
pub use registry::SessionRegistry;
pub use scheduler::{ManualScheduler, PeriodicScheduler, ScheduledTick, TickScheduler, TickTask};
pub use sink::{DeliverySink, EventChannel, FrameEvent};
pub use source::{FrameSource, Position, SessionHandle, SourceResolver};
pub use stats::ExtractionStats;
#[cfg(feature = "async")]
pub use stream::{FrameStream, StreamSink, frame_stream};
