//! Track and playlist model.
//!
//! A [`Playlist`] is built once per loaded item and never mutated afterwards.
//! Track indices are positions in the playlist, so `tracks[i].index == i`
//! always holds regardless of how the server numbered its files.

use crate::error::{PlaybackError, Result};
use bridge_traits::{ItemDetails, QueueItem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One audio file placed on the book's absolute timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub index: usize,
    /// Seconds from the start of the book.
    pub start_offset: f64,
    /// Seconds, always > 0.
    pub duration: f64,
    pub title: String,
    pub content_url: String,
    pub mime_type: String,
}

impl Track {
    pub fn end_offset(&self) -> f64 {
        self.start_offset + self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    item_id: String,
    title: String,
    tracks: Vec<Track>,
}

impl Playlist {
    /// Builds a playlist from already placed tracks, re-indexing them by
    /// position. Tracks with a non-positive duration are dropped.
    pub fn from_tracks(item_id: impl Into<String>, title: impl Into<String>, tracks: Vec<Track>) -> Self {
        let tracks = tracks
            .into_iter()
            .filter(|track| track.duration > 0.0)
            .enumerate()
            .map(|(index, track)| Track { index, ..track })
            .collect();

        Self {
            item_id: item_id.into(),
            title: title.into(),
            tracks,
        }
    }

    /// Builds the playlist for an item.
    ///
    /// Server-declared tracks win. When the server declares none, tracks are
    /// synthesised from the item's audio files in index order with cumulative
    /// start offsets.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::NoPlayableAudio`] when no track has a positive duration.
    pub fn from_details(details: &ItemDetails) -> Result<Self> {
        let tracks = if !details.tracks.is_empty() {
            let mut declared = details.tracks.clone();
            declared.sort_by_key(|track| track.index);
            declared
                .into_iter()
                .map(|track| Track {
                    index: track.index,
                    start_offset: track.start_offset.max(0.0),
                    duration: track.duration,
                    title: track.title,
                    content_url: track.content_url,
                    mime_type: track.mime_type,
                })
                .collect()
        } else {
            Self::synthesize(details)
        };

        let playlist = Self::from_tracks(&details.id, &details.title, tracks);
        if playlist.is_empty() {
            return Err(PlaybackError::NoPlayableAudio(details.id.clone()));
        }

        if let Some(declared) = details.duration {
            if (declared - playlist.total_duration()).abs() > 1.0 {
                warn!(
                    item_id = %details.id,
                    declared,
                    computed = playlist.total_duration(),
                    "Declared duration disagrees with track layout"
                );
            }
        }

        debug!(
            item_id = %details.id,
            track_count = playlist.len(),
            duration = playlist.total_duration(),
            "Built playlist"
        );
        Ok(playlist)
    }

    fn synthesize(details: &ItemDetails) -> Vec<Track> {
        let mut files = details.audio_files.clone();
        files.sort_by_key(|file| file.index);

        let mut offset = 0.0;
        let mut tracks = Vec::with_capacity(files.len());
        for file in files {
            if file.duration <= 0.0 {
                warn!(item_id = %details.id, file_index = file.index, "Skipping audio file without duration");
                continue;
            }
            tracks.push(Track {
                index: file.index,
                start_offset: offset,
                duration: file.duration,
                title: file.title,
                content_url: file.content_url,
                mime_type: file.mime_type,
            });
            offset += file.duration;
        }
        tracks
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.tracks.len().saturating_sub(1)
    }

    /// End of the last track, in seconds.
    pub fn total_duration(&self) -> f64 {
        self.tracks.last().map(Track::end_offset).unwrap_or(0.0)
    }

    /// Engine queue items for `tracks[from..]`.
    pub fn queue_items(&self, from: usize, headers: &HashMap<String, String>) -> Vec<QueueItem> {
        self.tracks
            .iter()
            .skip(from)
            .map(|track| QueueItem {
                track_index: track.index,
                url: track.content_url.clone(),
                mime_type: track.mime_type.clone(),
                title: track.title.clone(),
                headers: headers.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{RemoteAudioFile, RemoteTrack};

    fn file(index: usize, duration: f64) -> RemoteAudioFile {
        RemoteAudioFile {
            index,
            duration,
            title: format!("Part {}", index),
            content_url: format!("/api/items/li_1/file/{}", index),
            mime_type: "audio/mpeg".to_string(),
        }
    }

    fn remote_track(index: usize, start: f64, duration: f64) -> RemoteTrack {
        RemoteTrack {
            index,
            start_offset: start,
            duration,
            title: format!("Chapter {}", index),
            content_url: format!("/s/item/li_1/{}.mp3", index),
            mime_type: "audio/mpeg".to_string(),
        }
    }

    #[test]
    fn prefers_declared_tracks() {
        let details = ItemDetails {
            id: "li_1".into(),
            title: "Book".into(),
            tracks: vec![remote_track(2, 100.0, 50.0), remote_track(1, 0.0, 100.0)],
            audio_files: vec![file(1, 999.0)],
            duration: Some(150.0),
        };

        let playlist = Playlist::from_details(&details).unwrap();
        assert_eq!(playlist.len(), 2);
        assert_eq!(playlist.track(0).unwrap().title, "Chapter 1");
        assert_eq!(playlist.track(1).unwrap().start_offset, 100.0);
        assert_eq!(playlist.track(1).unwrap().index, 1);
        assert_eq!(playlist.total_duration(), 150.0);
    }

    #[test]
    fn synthesizes_cumulative_offsets_from_audio_files() {
        let details = ItemDetails {
            id: "li_2".into(),
            title: "Book".into(),
            audio_files: vec![file(3, 30.0), file(1, 60.0), file(2, 0.0), file(4, 10.0)],
            ..ItemDetails::default()
        };

        let playlist = Playlist::from_details(&details).unwrap();
        let layout: Vec<(usize, f64, f64)> = playlist
            .tracks()
            .iter()
            .map(|t| (t.index, t.start_offset, t.duration))
            .collect();
        assert_eq!(layout, vec![(0, 0.0, 60.0), (1, 60.0, 30.0), (2, 90.0, 10.0)]);
        assert_eq!(playlist.track(1).unwrap().title, "Part 3");
    }

    #[test]
    fn empty_item_has_no_playable_audio() {
        let details = ItemDetails {
            id: "li_3".into(),
            audio_files: vec![file(1, 0.0)],
            ..ItemDetails::default()
        };

        assert_eq!(
            Playlist::from_details(&details).unwrap_err(),
            PlaybackError::NoPlayableAudio("li_3".into())
        );
    }

    #[test]
    fn queue_items_start_at_requested_track() {
        let playlist = Playlist::from_tracks(
            "li_1",
            "Book",
            vec![
                Track {
                    index: 0,
                    start_offset: 0.0,
                    duration: 10.0,
                    title: "a".into(),
                    content_url: "u0".into(),
                    mime_type: "audio/mpeg".into(),
                },
                Track {
                    index: 1,
                    start_offset: 10.0,
                    duration: 10.0,
                    title: "b".into(),
                    content_url: "u1".into(),
                    mime_type: "audio/mpeg".into(),
                },
            ],
        );
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer t".to_string());

        let items = playlist.queue_items(1, &headers);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].track_index, 1);
        assert_eq!(items[0].url, "u1");
        assert_eq!(items[0].headers.get("Authorization").unwrap(), "Bearer t");
    }
}
