//! Audiobookshelf API request and response types
//!
//! Only the fields the playback core reads are modelled; everything else in
//! the payloads is ignored.

use serde::{Deserialize, Serialize};

/// Library item returned by `GET /api/items/{id}?expanded=1`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    pub id: String,
    pub media: BookMedia,
}

/// Book media of a library item
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMedia {
    #[serde(default)]
    pub metadata: BookMetadata,

    /// Server-computed playable tracks (present on expanded items)
    #[serde(default)]
    pub tracks: Vec<AudioTrack>,

    /// Raw audio files, used when no tracks were computed
    #[serde(default)]
    pub audio_files: Vec<AudioFile>,

    /// Total duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    #[serde(default)]
    pub title: Option<String>,
}

/// Playable track with its placement on the book timeline
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    pub index: usize,

    /// Seconds from the start of the book
    #[serde(default)]
    pub start_offset: f64,

    pub duration: f64,

    #[serde(default)]
    pub title: Option<String>,

    /// Usually relative to the server root (`/api/items/{id}/file/{ino}`)
    pub content_url: String,

    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Audio file resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFile {
    pub index: usize,

    /// Inode used to address the file
    pub ino: String,

    /// Null until the server has probed the file
    #[serde(default)]
    pub duration: Option<f64>,

    #[serde(default)]
    pub metadata: AudioFileMetadata,

    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFileMetadata {
    #[serde(default)]
    pub filename: Option<String>,
}

/// Session returned by `POST /api/items/{id}/play`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSessionResponse {
    pub id: String,

    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,
}

/// Progress returned by `GET /api/me/progress/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaProgress {
    #[serde(default)]
    pub current_time: f64,

    #[serde(default)]
    pub is_finished: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub client_name: String,
    pub client_version: String,
}

/// Body of `POST /api/items/{id}/play`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub device_info: DeviceInfo,
    pub supported_mime_types: Vec<String>,
    pub media_player: String,
    pub force_direct_play: bool,
}

/// Body of session sync and close calls
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub current_time: f64,
    pub time_listened: f64,
    pub duration: f64,
}

/// Body of `PATCH /api/me/progress/{id}`
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub current_time: f64,
    pub duration: f64,
    pub progress: f64,
    pub is_finished: bool,
    /// Epoch milliseconds
    pub last_update: i64,
}
