//! Timeline resolver.
//!
//! Maps absolute book time to `(track, offset)` and back, and plans how the
//! forward-only engine queue reaches a target: stay in the current item,
//! advance item by item, or rebuild the queue from an earlier track.

use crate::playlist::Playlist;

/// A point on the timeline expressed relative to one track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPosition {
    pub track_index: usize,
    pub offset: f64,
}

/// Resolves `absolute_time` to the track containing it.
///
/// The time is clamped to `[0, total_duration]`. Each track covers the
/// half-open interval `[start, start + duration)`; a time past the last
/// track's end resolves to the last track. A time falling in a gap between
/// two tracks snaps to the start of the following track.
pub fn locate(playlist: &Playlist, absolute_time: f64) -> TrackPosition {
    let total = playlist.total_duration();
    let time = if absolute_time.is_nan() {
        0.0
    } else {
        absolute_time.clamp(0.0, total.max(0.0))
    };

    for track in playlist.tracks() {
        if time < track.start_offset {
            return TrackPosition {
                track_index: track.index,
                offset: 0.0,
            };
        }
        if time < track.end_offset() {
            return TrackPosition {
                track_index: track.index,
                offset: time - track.start_offset,
            };
        }
    }

    match playlist.tracks().last() {
        Some(last) => TrackPosition {
            track_index: last.index,
            offset: time - last.start_offset,
        },
        None => TrackPosition {
            track_index: 0,
            offset: 0.0,
        },
    }
}

/// Inverse of [`locate`]: absolute seconds for an offset inside a track.
///
/// An out-of-range index resolves against the last track.
pub fn absolute_time(playlist: &Playlist, track_index: usize, offset: f64) -> f64 {
    let start = playlist
        .track(track_index.min(playlist.last_index()))
        .map(|track| track.start_offset)
        .unwrap_or(0.0);
    start + offset
}

/// How the engine queue reaches a target position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Navigation {
    /// Target is in the current item.
    WithinCurrent { offset: f64 },
    /// Step forward `steps` items, then seek.
    Advance { steps: usize, offset: f64 },
    /// Replace the queue with one starting at `track_index`, then seek.
    Rebuild { track_index: usize, offset: f64 },
}

impl Navigation {
    pub fn offset(&self) -> f64 {
        match *self {
            Navigation::WithinCurrent { offset }
            | Navigation::Advance { offset, .. }
            | Navigation::Rebuild { offset, .. } => offset,
        }
    }

    pub fn crosses_tracks(&self) -> bool {
        !matches!(self, Navigation::WithinCurrent { .. })
    }
}

/// Plans navigation from the engine's current item to `target`.
pub fn plan(current_track: usize, target: TrackPosition) -> Navigation {
    use std::cmp::Ordering;

    match target.track_index.cmp(&current_track) {
        Ordering::Equal => Navigation::WithinCurrent {
            offset: target.offset,
        },
        Ordering::Greater => Navigation::Advance {
            steps: target.track_index - current_track,
            offset: target.offset,
        },
        Ordering::Less => Navigation::Rebuild {
            track_index: target.track_index,
            offset: target.offset,
        },
    }
}
