//! An in-memory playback session.
//!
//! [`PlaybackSession`] is a reference [`FrameSource`]: a decoder thread
//! publishes frames into it, playback advances its position, and the
//! extractor reads it. [`SessionDirectory`] maps handles to sessions and is
//! the matching [`SourceResolver`]. The CLI's `simulate` command and the
//! integration tests drive the pipeline through these two types.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use frametap::{FrameSource, PixelBuffer, PixelFormat, PlaybackSession, Position};
//!
//! let session = Arc::new(PlaybackSession::new());
//! let frame = PixelBuffer::packed(2, 2, PixelFormat::Rgba8, vec![0u8; 16]);
//! session.publish(Position::from_millis(40), frame);
//!
//! let at = session.current_position();
//! assert!(session.has_new_frame(at));
//! assert!(session.take_frame(at).is_some());
//! assert!(!session.has_new_frame(at));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::SourceError;
use crate::pixel::PixelBuffer;
use crate::source::{FrameSource, Position, SessionHandle, SourceResolver};

#[derive(Debug)]
struct LatestFrame {
    position: Position,
    generation: u64,
    buffer: PixelBuffer,
}

#[derive(Debug, Default)]
struct SessionState {
    position: Position,
    latest: Option<LatestFrame>,
    generation: u64,
    handed_out: u64,
    attached: usize,
    ended: bool,
}

/// A live playback session holding the most recently decoded frame.
///
/// Only the newest frame is kept. A frame counts as "new" until
/// [`take_frame`](FrameSource::take_frame) hands it out, and only once
/// playback has reached its presentation position.
#[derive(Debug, Default)]
pub struct PlaybackSession {
    state: Mutex<SessionState>,
}

impl PlaybackSession {
    /// An empty session at position zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a decoded frame presented at `position` and advance playback
    /// to it.
    ///
    /// Ignored once the session has ended.
    pub fn publish(&self, position: Position, buffer: PixelBuffer) {
        let mut state = self.state.lock();
        if state.ended {
            return;
        }
        state.generation += 1;
        let generation = state.generation;
        state.latest = Some(LatestFrame {
            position,
            generation,
            buffer,
        });
        state.position = state.position.max(position);
    }

    /// Move the playback clock without publishing a frame (seek, pause).
    pub fn set_position(&self, position: Position) {
        self.state.lock().position = position;
    }

    /// Tear the session down. Every later lookup reports no frame.
    pub fn end(&self) {
        let mut state = self.state.lock();
        state.ended = true;
        state.latest = None;
    }

    /// Outputs currently attached through [`FrameSource::attach`].
    pub fn attached_outputs(&self) -> usize {
        self.state.lock().attached
    }

    /// Frames published so far.
    pub fn published_frames(&self) -> u64 {
        self.state.lock().generation
    }
}

impl SessionState {
    fn ready(&self, at: Position) -> Option<&LatestFrame> {
        if self.ended {
            return None;
        }
        self.latest.as_ref().filter(|latest| latest.position <= at)
    }
}

impl FrameSource for PlaybackSession {
    fn current_position(&self) -> Position {
        self.state.lock().position
    }

    fn has_new_frame(&self, at: Position) -> bool {
        let state = self.state.lock();
        state
            .ready(at)
            .is_some_and(|latest| latest.generation > state.handed_out)
    }

    fn take_frame(&self, at: Position) -> Option<PixelBuffer> {
        let mut state = self.state.lock();
        let (generation, buffer) = state
            .ready(at)
            .map(|latest| (latest.generation, latest.buffer.clone()))?;
        state.handed_out = generation;
        Some(buffer)
    }

    fn copy_frame(&self, at: Position) -> Option<PixelBuffer> {
        self.state.lock().ready(at).map(|latest| latest.buffer.clone())
    }

    fn attach(&self) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        if state.ended {
            return Err(SourceError::Ended);
        }
        state.attached += 1;
        Ok(())
    }

    fn detach(&self) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        if state.ended {
            return Err(SourceError::Ended);
        }
        if state.attached == 0 {
            return Err(SourceError::NotAttached);
        }
        state.attached -= 1;
        Ok(())
    }

    fn is_live(&self) -> bool {
        !self.state.lock().ended
    }
}

/// Handle-to-session lookup for [`PlaybackSession`]s.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    sessions: RwLock<HashMap<SessionHandle, Arc<PlaybackSession>>>,
}

impl SessionDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session, returning the one it replaced.
    pub fn insert(
        &self,
        handle: SessionHandle,
        session: Arc<PlaybackSession>,
    ) -> Option<Arc<PlaybackSession>> {
        self.sessions.write().insert(handle, session)
    }

    /// Remove a session from the directory. The session itself is not ended.
    pub fn remove(&self, handle: SessionHandle) -> Option<Arc<PlaybackSession>> {
        self.sessions.write().remove(&handle)
    }

    /// Look a session up, live or not.
    pub fn get(&self, handle: SessionHandle) -> Option<Arc<PlaybackSession>> {
        self.sessions.read().get(&handle).cloned()
    }

    /// Number of sessions in the directory.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl SourceResolver for SessionDirectory {
    fn resolve(&self, handle: SessionHandle) -> Option<Arc<dyn FrameSource>> {
        let session = self.get(handle)?;
        if !session.is_live() {
            return None;
        }
        Some(session as Arc<dyn FrameSource>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::PixelFormat;

    fn frame() -> PixelBuffer {
        PixelBuffer::packed(1, 1, PixelFormat::Gray8, vec![0u8])
    }

    #[test]
    fn frame_is_new_until_taken() {
        let session = PlaybackSession::new();
        let at = Position::from_millis(10);
        assert!(!session.has_new_frame(at));

        session.publish(at, frame());
        assert!(session.has_new_frame(at));
        assert!(session.take_frame(at).is_some());
        assert!(!session.has_new_frame(at));

        // Still readable for pulls after being taken.
        assert!(session.copy_frame(at).is_some());
    }

    #[test]
    fn copy_does_not_consume() {
        let session = PlaybackSession::new();
        let at = Position::from_millis(10);
        session.publish(at, frame());
        assert!(session.copy_frame(at).is_some());
        assert!(session.has_new_frame(at));
    }

    #[test]
    fn future_frame_is_not_ready() {
        let session = PlaybackSession::new();
        session.publish(Position::from_millis(100), frame());
        session.set_position(Position::from_millis(50));
        let at = session.current_position();
        assert!(!session.has_new_frame(at));
        assert!(session.take_frame(at).is_none());
    }

    #[test]
    fn ended_session_refuses_everything() {
        let session = PlaybackSession::new();
        session.publish(Position::from_millis(1), frame());
        session.attach().unwrap();
        session.end();

        let at = session.current_position();
        assert!(!session.is_live());
        assert!(!session.has_new_frame(at));
        assert!(session.take_frame(at).is_none());
        assert_eq!(session.attach(), Err(SourceError::Ended));
        assert_eq!(session.detach(), Err(SourceError::Ended));
    }

    #[test]
    fn unbalanced_detach_is_reported() {
        let session = PlaybackSession::new();
        assert_eq!(session.detach(), Err(SourceError::NotAttached));
        session.attach().unwrap();
        assert_eq!(session.attached_outputs(), 1);
        session.detach().unwrap();
        assert_eq!(session.attached_outputs(), 0);
    }

    #[test]
    fn directory_resolves_live_sessions_only() {
        let directory = SessionDirectory::new();
        let session = Arc::new(PlaybackSession::new());
        directory.insert(SessionHandle(7), Arc::clone(&session));

        assert!(directory.resolve(SessionHandle(7)).is_some());
        assert!(directory.resolve(SessionHandle(8)).is_none());

        session.end();
        assert!(directory.resolve(SessionHandle(7)).is_none());
        assert!(directory.get(SessionHandle(7)).is_some());
    }
}
