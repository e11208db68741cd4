//! Async push delivery.
//!
//! [`frame_stream`] pairs a [`StreamSink`], which an extractor or
//! [`EventChannel`](crate::EventChannel) delivers into, with a
//! [`FrameStream`] that implements [`tokio_stream::Stream`]. The two are
//! joined by a bounded channel: the tick thread never waits on a slow
//! consumer, it drops the frame instead.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio_stream::StreamExt;
//!
//! use frametap::{ExtractorOptions, FrameChannel, SessionDirectory, TickScheduler};
//!
//! # async fn example() -> Result<(), frametap::FrameTapError> {
//! let channel = FrameChannel::new(
//!     Arc::new(TickScheduler::new()?),
//!     Arc::new(SessionDirectory::new()),
//!     ExtractorOptions::new(),
//! );
//! let mut frames = channel.listen_stream(8);
//!
//! while let Some(event) = frames.next().await {
//!     println!("session {} frame at {}", event.session, event.position);
//! }
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_stream::Stream;

use crate::sink::{DeliverySink, FrameEvent};

/// Default bounded-channel capacity for [`frame_stream`].
///
/// Kept small so a stalled consumer holds only a few encoded frames.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// A stream of pushed frames.
///
/// Ends once every [`StreamSink`] feeding it has been dropped.
#[derive(Debug)]
pub struct FrameStream {
    receiver: Receiver<FrameEvent>,
}

impl Stream for FrameStream {
    type Item = FrameEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// The sending half of a [`FrameStream`].
#[derive(Debug, Clone)]
pub struct StreamSink {
    sender: Sender<FrameEvent>,
}

impl DeliverySink for StreamSink {
    fn deliver(&self, event: FrameEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => log::debug!(
                "Frame stream full; dropping frame from session {} at {}",
                event.session,
                event.position
            ),
            Err(TrySendError::Closed(event)) => log::trace!(
                "Frame stream closed; dropping frame from session {}",
                event.session
            ),
        }
    }
}

/// Create a connected sink and stream holding at most `capacity` frames.
///
/// A capacity of zero is raised to one.
pub fn frame_stream(capacity: usize) -> (StreamSink, FrameStream) {
    let (sender, receiver) = tokio::sync::mpsc::channel(capacity.max(1));
    (StreamSink { sender }, FrameStream { receiver })
}
