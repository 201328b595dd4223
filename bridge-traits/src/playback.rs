//! Playback engine bridge.
//!
//! The host owns the actual audio pipeline (AVQueuePlayer, ExoPlayer, a
//! GStreamer playbin). What the core sees is a **forward-only queue**: it can
//! load a list of items, step to the next one, seek inside the current one,
//! and, when it needs to go backwards, replace the whole queue with a new one
//! starting at an earlier track. Those two navigation primitives are kept
//! distinct on purpose; the coordinator's cost model depends on it.
//!
//! Engine callbacks are delivered as [`EngineEvent`]s through the
//! [`EngineEventSink`] handed over with each queue. Every queue carries a
//! [`QueueId`]; once a queue is replaced the engine must stop emitting events
//! for the old id, and the core drops any that still arrive.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of one loaded engine queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(Uuid);

impl QueueId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for QueueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One playable entry of an engine queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    /// Index of the playlist track this item plays.
    pub track_index: usize,
    /// Fully resolved stream URL.
    pub url: String,
    pub mime_type: String,
    pub title: String,
    /// Extra request headers the engine must send (e.g. Authorization).
    pub headers: HashMap<String, String>,
}

/// Callback payload emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEventKind {
    /// The queue's first item is prepared and playable.
    Ready,
    /// The engine could not prepare media.
    Failed { message: String },
    /// The item for `ended_track` played to its end.
    TrackBoundary { ended_track: usize },
    /// Periodic position report, in seconds into the item for `track_index`.
    TimeUpdate { track_index: usize, offset: f64 },
}

/// Engine callback tagged with the queue it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub queue: QueueId,
    pub kind: EngineEventKind,
}

impl EngineEvent {
    pub fn new(queue: QueueId, kind: EngineEventKind) -> Self {
        Self { queue, kind }
    }
}

/// Channel the engine reports through.
pub type EngineEventSink = mpsc::UnboundedSender<EngineEvent>;

/// Forward-only queue player provided by the host.
///
/// All methods act on the queue installed by the latest `load_queue` /
/// `rebuild_from` call.
#[async_trait]
pub trait QueueEngine: Send + Sync {
    /// Replace whatever is loaded with `items`. Readiness or failure is
    /// reported asynchronously through `events`, tagged with `queue`.
    async fn load_queue(
        &self,
        queue: QueueId,
        items: Vec<QueueItem>,
        events: EngineEventSink,
    ) -> Result<()>;

    /// Start or resume output at the engine's current rate.
    async fn play(&self) -> Result<()>;

    /// Hold playback by dropping the rate to zero. The item stays loaded so
    /// the host's now-playing association survives.
    async fn pause_at_zero_rate(&self) -> Result<()>;

    /// Seek inside the current item.
    async fn seek_within_current(&self, offset: f64) -> Result<()>;

    /// Drop the current item and make the next one current.
    async fn advance_to_next(&self) -> Result<()>;

    /// Retire the current queue (and its observers) and install a new one
    /// whose first item plays `track_index`.
    async fn rebuild_from(
        &self,
        queue: QueueId,
        track_index: usize,
        items: Vec<QueueItem>,
        events: EngineEventSink,
    ) -> Result<()>;

    /// Apply a playback rate to the current player object.
    async fn set_rate(&self, rate: f32) -> Result<()>;

    /// Track index of the current item, `None` once the queue is exhausted.
    async fn current_item(&self) -> Result<Option<usize>>;

    /// Position inside the current item, in seconds.
    async fn position_in_current(&self) -> Result<f64>;

    /// Stop output and release the queue.
    async fn teardown(&self) -> Result<()>;
}
