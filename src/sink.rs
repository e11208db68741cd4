//! Push delivery of encoded frames.
//!
//! Every extractor hands each frame it encodes to a [`DeliverySink`] as a
//! [`FrameEvent`]. [`EventChannel`] is the sink the registry normally uses:
//! a single subscriber slot that a consumer can fill, replace, or clear at
//! any time.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::encoder::EncodedFrame;
use crate::source::{Position, SessionHandle};

/// One encoded frame pushed by an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEvent {
    /// The session the frame came from.
    pub session: SessionHandle,
    /// Playback position the frame was taken at.
    pub position: Position,
    /// The compressed image.
    pub frame: EncodedFrame,
}

/// Receives pushed frames.
///
/// Called on the tick thread while the producing extractor's lock is held:
/// implementations must return quickly and must not unregister the session
/// they are receiving from.
pub trait DeliverySink: Send + Sync {
    /// Take ownership of one event.
    fn deliver(&self, event: FrameEvent);
}

impl<F> DeliverySink for F
where
    F: Fn(FrameEvent) + Send + Sync,
{
    fn deliver(&self, event: FrameEvent) {
        self(event)
    }
}

/// A single-subscriber event slot.
///
/// [`subscribe`](Self::subscribe) replaces whatever subscriber was there;
/// with no subscriber, delivered frames are dropped.
#[derive(Default)]
pub struct EventChannel {
    subscriber: RwLock<Option<Arc<dyn DeliverySink>>>,
}

impl EventChannel {
    /// A channel with no subscriber.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `sink` as the subscriber, returning the one it replaced.
    pub fn subscribe(&self, sink: Arc<dyn DeliverySink>) -> Option<Arc<dyn DeliverySink>> {
        let previous = self.subscriber.write().replace(sink);
        log::debug!(
            "Event subscriber {}",
            if previous.is_some() { "replaced" } else { "attached" }
        );
        previous
    }

    /// Remove the subscriber, if any.
    pub fn unsubscribe(&self) -> Option<Arc<dyn DeliverySink>> {
        let previous = self.subscriber.write().take();
        if previous.is_some() {
            log::debug!("Event subscriber cancelled");
        }
        previous
    }

    /// Whether a subscriber is installed.
    pub fn has_subscriber(&self) -> bool {
        self.subscriber.read().is_some()
    }
}

impl DeliverySink for EventChannel {
    fn deliver(&self, event: FrameEvent) {
        // Clone out so a subscriber swap is never blocked by a slow consumer.
        let subscriber = self.subscriber.read().clone();
        match subscriber {
            Some(sink) => sink.deliver(event),
            None => log::trace!(
                "No subscriber; dropping frame from session {} at {}",
                event.session,
                event.position
            ),
        }
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("has_subscriber", &self.has_subscriber())
            .finish()
    }
}
