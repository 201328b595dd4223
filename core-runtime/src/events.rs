//! # Event Bus System
//!
//! Typed broadcast events for the playback core, built on
//! `tokio::sync::broadcast`.
//!
//! The continuously changing playback fields (position, rate, track index)
//! are published through the coordinator's snapshot channel. This bus is for
//! discrete happenings that observers may want to react to once: an item was
//! loaded, playback paused, a session was opened, a sync failed.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Playback(PlaybackEvent::Ended {
//!     item_id: "li_1".to_string(),
//! }))
//! .ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "Reached end of item");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep receiving.
//! - **`RecvError::Closed`**: every sender is gone; treat it as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Playback state machine events
    Playback(PlaybackEvent),
    /// Server session and progress events
    Session(SessionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Session(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Session(SessionEvent::SyncFailed { .. })
            | CoreEvent::Session(SessionEvent::ProgressSaveFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::ItemLoaded { .. })
            | CoreEvent::Playback(PlaybackEvent::Ended { .. })
            | CoreEvent::Session(SessionEvent::Opened { .. })
            | CoreEvent::Session(SessionEvent::Closed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events emitted by the playback state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// An item's playlist was built and handed to the engine.
    ItemLoaded {
        item_id: String,
        track_count: usize,
        /// Total duration in seconds.
        duration: f64,
    },
    /// Playback started or resumed.
    Started {
        item_id: String,
        /// Absolute position in seconds.
        position: f64,
    },
    /// Playback paused.
    Paused { item_id: String, position: f64 },
    /// The current track changed (navigation or natural advance).
    TrackChanged {
        item_id: String,
        track_index: usize,
        title: String,
    },
    /// The engine's queue ran out.
    Ended { item_id: String },
    /// Preferred playback rate changed.
    RateChanged { rate: f32 },
    /// The sleep timer reached zero and paused playback.
    SleepTimerFired { item_id: String },
    /// Load or engine failure.
    Error {
        item_id: Option<String>,
        message: String,
        /// Whether a reload can recover.
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::ItemLoaded { .. } => "Item loaded",
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::TrackChanged { .. } => "Track changed",
            PlaybackEvent::Ended { .. } => "Reached end of item",
            PlaybackEvent::RateChanged { .. } => "Playback rate changed",
            PlaybackEvent::SleepTimerFired { .. } => "Sleep timer fired",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// Events emitted by the session synchronization manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// A listening session was opened on the server.
    Opened { item_id: String, session_id: String },
    /// A session sync call succeeded.
    Synced {
        session_id: String,
        current_time: f64,
        time_listened: f64,
    },
    /// A session sync call failed; the next periodic tick retries implicitly.
    SyncFailed { session_id: String, message: String },
    /// A session was closed.
    Closed { session_id: String },
    /// Durable progress was persisted.
    ProgressSaved {
        item_id: String,
        current_time: f64,
        is_finished: bool,
    },
    /// Durable progress could not be persisted.
    ProgressSaveFailed { item_id: String, message: String },
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::Opened { .. } => "Session opened",
            SessionEvent::Synced { .. } => "Session synced",
            SessionEvent::SyncFailed { .. } => "Session sync failed",
            SessionEvent::Closed { .. } => "Session closed",
            SessionEvent::ProgressSaved { .. } => "Progress saved",
            SessionEvent::ProgressSaveFailed { .. } => "Progress save failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus clones the sender; every `subscribe()` creates an
/// independent receiver that only sees events emitted after it was created.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }

    /// Receives a matching event without waiting. `None` when drained.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => match &self.filter {
                    Some(filter) if !filter(&event) => continue,
                    _ => return Some(Ok(event)),
                },
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
