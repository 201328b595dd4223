//! Observable playback state.

use serde::{Deserialize, Serialize};

/// Coordinator lifecycle for the loaded item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    /// Transient: a seek is moving the engine to another track.
    SwitchingTrack,
    Ended,
    Failed,
}

impl PlayerState {
    /// States in which a playlist exists and the engine holds a queue.
    pub fn has_queue(&self) -> bool {
        matches!(
            self,
            PlayerState::Ready
                | PlayerState::Playing
                | PlayerState::Paused
                | PlayerState::SwitchingTrack
        )
    }
}

/// What the presentation layer shows for the load path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadingStatus {
    Idle,
    Loading,
    Ready,
    /// Retry-eligible: no track could be prepared.
    NoPlayableAudio,
    /// Retry-eligible: the server could not be reached or answered garbage.
    NetworkError(String),
}

/// Read-only view of the coordinator, published after every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub item_id: Option<String>,
    pub state: PlayerState,
    pub is_playing: bool,
    /// Absolute seconds.
    pub current_time: f64,
    pub duration: f64,
    /// Preferred rate; the engine runs at 0 while paused.
    pub rate: f32,
    pub current_track_index: usize,
    pub current_track_title: Option<String>,
    pub has_audio_stream: bool,
    pub current_chapter_start: f64,
    pub current_chapter_duration: f64,
    /// Whole seconds left on the sleep timer.
    pub sleep_remaining: Option<u64>,
    pub loading_status: LoadingStatus,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            item_id: None,
            state: PlayerState::Idle,
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            rate: 1.0,
            current_track_index: 0,
            current_track_title: None,
            has_audio_stream: false,
            current_chapter_start: 0.0,
            current_chapter_duration: 0.0,
            sleep_remaining: None,
            loading_status: LoadingStatus::Idle,
        }
    }
}

impl PlaybackSnapshot {
    /// Fraction of the item listened, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        (self.current_time / self.duration).clamp(0.0, 1.0)
    }
}
