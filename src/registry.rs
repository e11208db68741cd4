//! The session registry.
//!
//! [`SessionRegistry`] owns one [`FrameExtractor`] per registered
//! [`SessionHandle`] and routes registration, unregistration, and pull
//! requests to it. All extractors share the registry's scheduler, encoder,
//! and delivery sink.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use frametap::{
//!     EventChannel, ExtractorOptions, FrameTapError, ManualScheduler, PlaybackSession,
//!     SessionHandle, SessionRegistry,
//! };
//!
//! let registry = SessionRegistry::new(
//!     Arc::new(ManualScheduler::new()),
//!     Arc::new(EventChannel::new()),
//!     ExtractorOptions::new(),
//! );
//!
//! registry.register(SessionHandle(42), Arc::new(PlaybackSession::new()))?;
//! assert!(registry.current_frame(SessionHandle(42))?.is_none());
//!
//! registry.unregister(SessionHandle(42))?;
//! assert!(matches!(
//!     registry.current_frame(SessionHandle(42)),
//!     Err(FrameTapError::NotRegistered(_))
//! ));
//! # Ok::<(), FrameTapError>(())
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::configuration::{ExtractorOptions, ReregisterPolicy};
use crate::encoder::{EncodedFrame, FrameEncoder, ImageEncoder};
use crate::error::FrameTapError;
use crate::extractor::{ExtractorState, FrameExtractor};
use crate::scheduler::PeriodicScheduler;
use crate::sink::DeliverySink;
use crate::source::{FrameSource, SessionHandle};
use crate::stats::ExtractionStats;

/// Maps session handles to running extractors.
///
/// At most one extractor exists per handle. Unregistering a handle stops its
/// extractor before the call returns, and dropping the registry stops them
/// all.
pub struct SessionRegistry {
    extractors: RwLock<HashMap<SessionHandle, Arc<FrameExtractor>>>,
    lifecycle: Mutex<HashMap<SessionHandle, Arc<Mutex<()>>>>,
    scheduler: Arc<dyn PeriodicScheduler>,
    encoder: Arc<dyn ImageEncoder>,
    sink: Arc<dyn DeliverySink>,
    options: ExtractorOptions,
}

impl SessionRegistry {
    /// Create an empty registry.
    ///
    /// Frames are encoded with a [`FrameEncoder`] built from the image format
    /// and output size in `options`.
    pub fn new(
        scheduler: Arc<dyn PeriodicScheduler>,
        sink: Arc<dyn DeliverySink>,
        options: ExtractorOptions,
    ) -> Self {
        let encoder = FrameEncoder::new(options.image_format())
            .with_output(options.frame_output().clone());
        Self {
            extractors: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(HashMap::new()),
            scheduler,
            encoder: Arc::new(encoder),
            sink,
            options,
        }
    }

    /// Use a custom encoder for every extractor created from now on.
    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn ImageEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Start extracting frames from `source` under `handle`.
    ///
    /// If `handle` is already registered, the configured
    /// [`ReregisterPolicy`] decides: `Replace` stops the old extractor and
    /// starts a new one, `Reject` fails.
    ///
    /// Registration and unregistration of one handle are serialized; other
    /// sessions keep ticking and serving pulls meanwhile.
    ///
    /// # Errors
    ///
    /// - [`FrameTapError::SourceUnavailable`] if the source has ended or
    ///   cannot be attached.
    /// - [`FrameTapError::AlreadyRegistered`] under the `Reject` policy.
    /// - [`FrameTapError::Scheduler`] if the tick cannot be scheduled.
    pub fn register(
        &self,
        handle: SessionHandle,
        source: Arc<dyn FrameSource>,
    ) -> Result<(), FrameTapError> {
        if !source.is_live() {
            return Err(FrameTapError::SourceUnavailable {
                handle,
                reason: "playback session has ended".to_string(),
            });
        }

        self.with_handle_locked(handle, || {
            let previous = self.extractor(handle);
            if let Some(previous) = &previous {
                if self.options.reregister_policy() == ReregisterPolicy::Reject {
                    return Err(FrameTapError::AlreadyRegistered(handle));
                }
                // The old extractor stays mapped, stopped, until the new one
                // takes its slot.
                previous.stop();
                log::debug!("Replacing extractor for session {handle}");
            }

            let extractor = FrameExtractor::new(
                handle,
                source,
                Arc::clone(&self.encoder),
                Arc::clone(&self.sink),
                &self.options,
            );
            if let Err(error) = extractor.start(self.scheduler.as_ref()) {
                if previous.is_some() {
                    self.extractors.write().remove(&handle);
                }
                return Err(error);
            }

            let mut extractors = self.extractors.write();
            extractors.insert(handle, extractor);
            log::debug!(
                "Registered session {handle} ({} active)",
                extractors.len()
            );
            Ok(())
        })
    }

    /// Stop and remove the extractor for `handle`.
    ///
    /// The extractor is stopped, waiting out an in-flight tick, before it
    /// leaves the registry. A concurrent `register` of the same handle
    /// starts only after this returns.
    ///
    /// # Errors
    ///
    /// [`FrameTapError::NotRegistered`] if `handle` is unknown; the registry
    /// is left unchanged.
    pub fn unregister(&self, handle: SessionHandle) -> Result<(), FrameTapError> {
        self.with_handle_locked(handle, || {
            let extractor = self
                .extractor(handle)
                .ok_or(FrameTapError::NotRegistered(handle))?;
            extractor.stop();
            self.extractors.write().remove(&handle);
            log::debug!("Unregistered session {handle}");
            Ok(())
        })
    }

    /// Encode the frame currently on screen for `handle`.
    ///
    /// Returns `Ok(None)` if the session has not decoded a frame yet, its
    /// extractor has stopped, or the frame could not be encoded.
    ///
    /// # Errors
    ///
    /// [`FrameTapError::NotRegistered`] if `handle` is unknown.
    pub fn current_frame(
        &self,
        handle: SessionHandle,
    ) -> Result<Option<EncodedFrame>, FrameTapError> {
        self.extractor(handle)
            .map(|extractor| extractor.current_frame())
            .ok_or(FrameTapError::NotRegistered(handle))
    }

    /// The extractor registered under `handle`.
    pub fn extractor(&self, handle: SessionHandle) -> Option<Arc<FrameExtractor>> {
        self.extractors.read().get(&handle).cloned()
    }

    /// Whether `handle` is registered.
    pub fn contains(&self, handle: SessionHandle) -> bool {
        self.extractors.read().contains_key(&handle)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.extractors.read().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.extractors.read().is_empty()
    }

    /// Registered handles, in ascending order.
    pub fn handles(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<_> = self.extractors.read().keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Counters for the extractor under `handle`.
    ///
    /// # Errors
    ///
    /// [`FrameTapError::NotRegistered`] if `handle` is unknown.
    pub fn stats(&self, handle: SessionHandle) -> Result<ExtractionStats, FrameTapError> {
        self.extractor(handle)
            .map(|extractor| extractor.stats())
            .ok_or(FrameTapError::NotRegistered(handle))
    }

    /// Lifecycle state of the extractor under `handle`.
    ///
    /// An extractor whose source ended stays registered in the
    /// [`Stopped`](ExtractorState::Stopped) state until it is unregistered.
    pub fn state(&self, handle: SessionHandle) -> Option<ExtractorState> {
        self.extractor(handle).map(|extractor| extractor.state())
    }

    /// Stop and remove every extractor.
    pub fn clear(&self) {
        for handle in self.handles() {
            // Already gone if a concurrent unregister won the race.
            let _ = self.unregister(handle);
        }
    }

    fn with_handle_locked<T>(
        &self,
        handle: SessionHandle,
        operation: impl FnOnce() -> Result<T, FrameTapError>,
    ) -> Result<T, FrameTapError> {
        let lock = Arc::clone(self.lifecycle.lock().entry(handle).or_default());
        let result = {
            let _guard = lock.lock();
            operation()
        };

        let mut locks = self.lifecycle.lock();
        // Only the map and this call hold it: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&handle);
        }
        result
    }

    /// Settings applied to new extractors.
    pub fn options(&self) -> &ExtractorOptions {
        &self.options
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("handles", &self.handles())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
