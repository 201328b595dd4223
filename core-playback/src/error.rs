//! # Playback Error Types
//!
//! Error taxonomy for the playback coordinator. Every variant is recovered
//! locally by the coordinator; callers only see them as command results and
//! through the `has_audio_stream` / `loading_status` snapshot fields.

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// Host or credentials missing; raised before any network call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport or HTTP status failure on a server call.
    #[error("Network error: {0}")]
    Network(String),

    /// Server payload could not be decoded.
    #[error("Malformed server response: {0}")]
    Decode(String),

    /// The engine failed to prepare or control media.
    #[error("Engine error: {0}")]
    Engine(String),

    /// The item has no track with a positive duration, or the engine could
    /// not prepare any of them.
    #[error("No playable audio for item {0}")]
    NoPlayableAudio(String),

    /// A newer `load` replaced this one before it became ready.
    #[error("Load of item {0} was superseded")]
    Superseded(String),

    /// The coordinator was torn down; the handle is no longer usable.
    #[error("Playback coordinator has stopped")]
    CoordinatorStopped,
}

impl PlaybackError {
    /// Returns `true` for failures that propagate as network errors.
    ///
    /// Malformed payloads count as network errors: the remedy is the same
    /// (retry later), and the user sees the same retry-eligible state.
    pub fn is_network_error(&self) -> bool {
        matches!(self, PlaybackError::Network(_) | PlaybackError::Decode(_))
    }

    /// Wraps a server-side failure, keeping the decode/network distinction.
    pub fn from_server(err: BridgeError) -> Self {
        match err {
            BridgeError::Decode(msg) => PlaybackError::Decode(msg),
            other => PlaybackError::Network(other.to_string()),
        }
    }

    /// Wraps an engine adapter failure.
    pub fn from_engine(err: BridgeError) -> Self {
        match err {
            BridgeError::Engine(msg) => PlaybackError::Engine(msg),
            other => PlaybackError::Engine(other.to_string()),
        }
    }
}

impl From<core_runtime::Error> for PlaybackError {
    fn from(err: core_runtime::Error) -> Self {
        PlaybackError::Configuration(err.to_string())
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
