//! Media server bridge.
//!
//! Request/response shapes the playback core needs from the remote library
//! server. Providers (e.g. `provider-audiobookshelf`) implement
//! [`MediaServer`] on top of an injected [`HttpClient`](crate::http::HttpClient).

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A server-declared track with its absolute placement on the book timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub index: usize,
    /// Seconds from the start of the book.
    pub start_offset: f64,
    pub duration: f64,
    pub title: String,
    /// Resolved stream URL.
    pub content_url: String,
    pub mime_type: String,
}

/// A raw audio file of an item; used when the server declares no tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAudioFile {
    pub index: usize,
    pub duration: f64,
    pub title: String,
    pub content_url: String,
    pub mime_type: String,
}

/// Result of `fetchItemDetails`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub id: String,
    pub title: String,
    pub tracks: Vec<RemoteTrack>,
    pub audio_files: Vec<RemoteAudioFile>,
    pub duration: Option<f64>,
}

/// Result of `startSession`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedSession {
    pub session_id: String,
    pub audio_tracks: Vec<RemoteTrack>,
}

/// Lightweight session sync payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSync {
    pub current_time: f64,
    /// Wall-clock seconds listened since the previous sync.
    pub time_listened: f64,
    pub duration: f64,
}

/// Durable progress record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub current_time: f64,
    pub duration: f64,
    /// `current_time / duration`, in `0.0..=1.0`.
    pub progress: f64,
    pub is_finished: bool,
    pub last_update_ms: i64,
}

/// Remote library server consumed by the playback coordinator.
#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Fetch the playable structure of an item.
    async fn fetch_item_details(&self, item_id: &str) -> Result<ItemDetails>;

    /// Open a listening session for an item.
    async fn start_session(&self, item_id: &str) -> Result<StartedSession>;

    /// Report position and listened time for an open session.
    async fn sync_session(&self, session_id: &str, sync: SessionSync) -> Result<()>;

    /// Close a session, optionally with a final sync payload.
    async fn close_session(&self, session_id: &str, sync: Option<SessionSync>) -> Result<()>;

    /// Saved position for an item; `None` when the server has none.
    async fn load_progress(&self, item_id: &str) -> Result<Option<f64>>;

    /// Persist durable progress for an item.
    async fn save_progress(&self, item_id: &str, update: ProgressUpdate) -> Result<()>;
}
