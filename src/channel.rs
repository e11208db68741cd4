//! The host-facing method and event surface.
//!
//! [`FrameChannel`] exposes the registry the way a plugin host talks to it:
//! named method calls with loosely typed arguments, results or string-coded
//! errors, and a single event subscriber that receives every pushed frame.
//! [`FrameChannel::handle_json`] wraps the same surface in a JSON envelope
//! for transports that only carry text.
//!
//! | Method              | Arguments       | Result                          |
//! |---------------------|-----------------|---------------------------------|
//! | `registerSession`   | `{"handle": n}` | `{"success": true, "message"}`  |
//! | `unregisterSession` | `{"handle": n}` | `{"success": bool}`             |
//! | `getCurrentFrame`   | `{"handle": n}` | `{"width", "height", "bytes"}` or `null` |
//!
//! `registerVideoPlayer` / `unregisterVideoPlayer` are accepted as aliases,
//! and `textureId` as an alias of `handle`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use frametap::{
//!     ExtractorOptions, FrameChannel, ManualScheduler, PlaybackSession, SessionDirectory,
//!     SessionHandle,
//! };
//!
//! let directory = Arc::new(SessionDirectory::new());
//! directory.insert(SessionHandle(7), Arc::new(PlaybackSession::new()));
//!
//! let channel = FrameChannel::new(
//!     Arc::new(ManualScheduler::new()),
//!     directory,
//!     ExtractorOptions::new(),
//! );
//!
//! let reply = channel.handle_json(r#"{"method": "registerSession", "arguments": {"handle": 7}}"#);
//! assert!(reply.contains(r#""success":true"#));
//!
//! let reply = channel.handle_json(r#"{"method": "getCurrentFrame", "arguments": {"handle": 99}}"#);
//! assert!(reply.contains("NOT_REGISTERED"));
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Value, json};
use thiserror::Error;

use crate::configuration::ExtractorOptions;
use crate::encoder::EncodedFrame;
use crate::error::FrameTapError;
use crate::registry::SessionRegistry;
use crate::scheduler::PeriodicScheduler;
use crate::sink::{DeliverySink, EventChannel, FrameEvent};
use crate::source::{SessionHandle, SourceResolver};

/// A method invocation from the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodCall {
    /// Method name.
    pub method: String,
    /// Argument map. Missing arguments deserialize as `null`.
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    /// Build a call.
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// Error codes reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    /// Missing or malformed arguments.
    InvalidArgs,
    /// The playback session could not be resolved or attached.
    SourceUnavailable,
    /// The handle is not registered.
    NotRegistered,
    /// The handle is registered and re-registration is rejected.
    AlreadyRegistered,
    /// Unknown method.
    NotImplemented,
    /// Anything else (encoding or scheduler failures).
    Internal,
}

impl ErrorCode {
    /// The wire spelling of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgs => "INVALID_ARGS",
            ErrorCode::SourceUnavailable => "SOURCE_UNAVAILABLE",
            ErrorCode::NotRegistered => "NOT_REGISTERED",
            ErrorCode::AlreadyRegistered => "ALREADY_REGISTERED",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// An error returned to the host: a machine-readable code plus a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{code}: {message}")]
pub struct ChannelError {
    /// What went wrong.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl ChannelError {
    /// Build an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<FrameTapError> for ChannelError {
    fn from(error: FrameTapError) -> Self {
        let code = match &error {
            FrameTapError::InvalidArgument(_) => ErrorCode::InvalidArgs,
            FrameTapError::NotRegistered(_) => ErrorCode::NotRegistered,
            FrameTapError::AlreadyRegistered(_) => ErrorCode::AlreadyRegistered,
            FrameTapError::SourceUnavailable { .. } => ErrorCode::SourceUnavailable,
            _ => ErrorCode::Internal,
        };
        Self::new(code, error.to_string())
    }
}

/// An encoded frame as the host sees it.
///
/// `handle` is set on pushed events and omitted from pull results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FramePayload {
    /// Session the frame belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<i64>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Compressed image bytes; base64 in JSON.
    #[serde(serialize_with = "serialize_base64")]
    pub bytes: Vec<u8>,
}

impl From<EncodedFrame> for FramePayload {
    fn from(frame: EncodedFrame) -> Self {
        Self {
            handle: None,
            width: frame.width,
            height: frame.height,
            bytes: frame.data,
        }
    }
}

impl From<FrameEvent> for FramePayload {
    fn from(event: FrameEvent) -> Self {
        Self {
            handle: Some(event.session.get()),
            ..Self::from(event.frame)
        }
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// A successful method result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MethodResponse {
    /// Outcome of a register or unregister call.
    Ack {
        /// Whether the call took effect.
        success: bool,
        /// Optional human-readable detail.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// A pulled frame.
    Frame(FramePayload),
    /// No frame available yet. Serializes as `null`.
    Empty,
}

/// The host-facing surface over a [`SessionRegistry`].
pub struct FrameChannel {
    registry: SessionRegistry,
    resolver: Arc<dyn SourceResolver>,
    events: Arc<EventChannel>,
}

impl FrameChannel {
    /// Create a channel whose registry pushes frames into its own event slot.
    pub fn new(
        scheduler: Arc<dyn PeriodicScheduler>,
        resolver: Arc<dyn SourceResolver>,
        options: ExtractorOptions,
    ) -> Self {
        let events = Arc::new(EventChannel::new());
        let registry = SessionRegistry::new(
            scheduler,
            Arc::clone(&events) as Arc<dyn DeliverySink>,
            options,
        );
        Self {
            registry,
            resolver,
            events,
        }
    }

    /// The registry behind the channel.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Dispatch one method call.
    ///
    /// # Errors
    ///
    /// A [`ChannelError`] carrying the code the host should see.
    pub fn handle(&self, call: &MethodCall) -> Result<MethodResponse, ChannelError> {
        log::trace!("Channel call {}", call.method);
        match call.method.as_str() {
            "registerSession" | "registerVideoPlayer" => self.register(&call.arguments),
            "unregisterSession" | "unregisterVideoPlayer" => self.unregister(&call.arguments),
            "getCurrentFrame" => self.current_frame(&call.arguments),
            other => Err(ChannelError::new(
                ErrorCode::NotImplemented,
                format!("Unknown method '{other}'"),
            )),
        }
    }

    /// Dispatch a JSON-encoded [`MethodCall`] and return a JSON envelope:
    /// `{"result": …}` on success or `{"error": {"code", "message"}}`.
    pub fn handle_json(&self, request: &str) -> String {
        let outcome = serde_json::from_str::<MethodCall>(request)
            .map_err(|error| {
                ChannelError::new(ErrorCode::InvalidArgs, format!("Malformed request: {error}"))
            })
            .and_then(|call| self.handle(&call));

        match outcome {
            Ok(response) => json!({ "result": response }),
            Err(error) => json!({ "error": error }),
        }
        .to_string()
    }

    /// Subscribe to pushed frames, replacing any previous subscriber.
    pub fn listen<F>(&self, sink: F)
    where
        F: Fn(FramePayload) + Send + Sync + 'static,
    {
        let forward = move |event: FrameEvent| sink(FramePayload::from(event));
        self.events.subscribe(Arc::new(forward));
    }

    /// Subscribe a bounded stream to pushed frames, replacing any previous
    /// subscriber. Frames are dropped while the stream is full.
    #[cfg(feature = "async")]
    pub fn listen_stream(&self, capacity: usize) -> crate::stream::FrameStream {
        let (sink, stream) = crate::stream::frame_stream(capacity);
        self.events.subscribe(Arc::new(sink));
        stream
    }

    /// Remove the subscriber. Frames produced afterwards are dropped.
    pub fn cancel(&self) {
        self.events.unsubscribe();
    }

    fn register(&self, arguments: &Value) -> Result<MethodResponse, ChannelError> {
        let handle = handle_argument(arguments)?;
        let source = self.resolver.resolve(handle).ok_or_else(|| {
            ChannelError::new(
                ErrorCode::SourceUnavailable,
                format!("Playback session {handle} is not available"),
            )
        })?;
        self.registry.register(handle, source)?;
        Ok(MethodResponse::Ack {
            success: true,
            message: Some(format!("Session {handle} registered")),
        })
    }

    fn unregister(&self, arguments: &Value) -> Result<MethodResponse, ChannelError> {
        let handle = handle_argument(arguments)?;
        let success = match self.registry.unregister(handle) {
            Ok(()) => true,
            Err(FrameTapError::NotRegistered(_)) => false,
            Err(error) => return Err(error.into()),
        };
        Ok(MethodResponse::Ack {
            success,
            message: None,
        })
    }

    fn current_frame(&self, arguments: &Value) -> Result<MethodResponse, ChannelError> {
        let handle = handle_argument(arguments)?;
        Ok(match self.registry.current_frame(handle)? {
            Some(frame) => MethodResponse::Frame(frame.into()),
            None => MethodResponse::Empty,
        })
    }
}

impl std::fmt::Debug for FrameChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameChannel")
            .field("registry", &self.registry)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

fn handle_argument(arguments: &Value) -> Result<SessionHandle, ChannelError> {
    let value = arguments
        .get("handle")
        .or_else(|| arguments.get("textureId"))
        .ok_or_else(|| ChannelError::new(ErrorCode::InvalidArgs, "Missing handle"))?;
    value
        .as_i64()
        .map(SessionHandle)
        .ok_or_else(|| ChannelError::new(ErrorCode::InvalidArgs, "Handle must be an integer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_argument_accepts_both_keys() {
        assert_eq!(handle_argument(&json!({ "handle": 3 })).unwrap(), SessionHandle(3));
        assert_eq!(
            handle_argument(&json!({ "textureId": -8 })).unwrap(),
            SessionHandle(-8)
        );
    }

    #[test]
    fn handle_argument_rejects_bad_input() {
        for arguments in [json!(null), json!({}), json!({ "handle": "7" }), json!({ "handle": 1.5 })] {
            let error = handle_argument(&arguments).unwrap_err();
            assert_eq!(error.code, ErrorCode::InvalidArgs);
        }
    }

    #[test]
    fn error_codes_serialize_in_wire_spelling() {
        for code in [
            ErrorCode::InvalidArgs,
            ErrorCode::SourceUnavailable,
            ErrorCode::NotRegistered,
            ErrorCode::AlreadyRegistered,
            ErrorCode::NotImplemented,
            ErrorCode::Internal,
        ] {
            assert_eq!(serde_json::to_value(code).unwrap(), json!(code.as_str()));
        }
    }

    #[test]
    fn payload_serializes_bytes_as_base64() {
        let payload = FramePayload {
            handle: None,
            width: 2,
            height: 1,
            bytes: vec![0xFF, 0xD8, 0xFF],
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "width": 2, "height": 1, "bytes": "/9j/" })
        );
    }

    #[test]
    fn empty_response_is_null() {
        assert_eq!(serde_json::to_value(MethodResponse::Empty).unwrap(), Value::Null);
        assert_eq!(
            serde_json::to_value(MethodResponse::Ack { success: false, message: None }).unwrap(),
            json!({ "success": false })
        );
    }

    #[test]
    fn frametap_errors_map_to_codes() {
        let error: ChannelError = FrameTapError::NotRegistered(SessionHandle(1)).into();
        assert_eq!(error.code, ErrorCode::NotRegistered);
        let error: ChannelError = FrameTapError::AlreadyRunning(SessionHandle(1)).into();
        assert_eq!(error.code, ErrorCode::Internal);
    }
}
