//! Recording fakes for the engine and the media server.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BridgeError, EngineEvent, EngineEventKind, EngineEventSink, InMemorySettingsStore, ItemDetails,
    FixedClock, MediaServer, ProgressUpdate, QueueEngine, QueueId, QueueItem, RemoteAudioFile,
    RemoteTrack, SessionSync, SettingsStore, StartedSession,
};
use chrono::{DateTime, Utc};
use core_playback::{spawn, PlaybackDeps, PlaybackHandle, PlaybackTuning};
use core_runtime::events::EventBus;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    LoadQueue { first: usize, len: usize },
    Play,
    Pause,
    Seek(f64),
    Advance,
    Rebuild { from: usize, len: usize },
    SetRate(f32),
    Teardown,
}

#[derive(Default)]
struct EngineInner {
    calls: Vec<EngineCall>,
    queue: Option<(QueueId, EngineEventSink)>,
    items: VecDeque<QueueItem>,
    position: f64,
    fail_prepare: bool,
    report_on_advance: bool,
}

/// Forward-only queue that records every call it receives.
#[derive(Clone, Default)]
pub struct FakeEngine {
    inner: Arc<Mutex<EngineInner>>,
}

impl FakeEngine {
    pub fn failing() -> Self {
        let engine = Self::default();
        engine.inner.lock().unwrap().fail_prepare = true;
        engine
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn count(&self, matches: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    pub fn queue_id(&self) -> Option<QueueId> {
        self.inner.lock().unwrap().queue.as_ref().map(|(id, _)| *id)
    }

    /// Headers attached to the current item.
    pub fn current_headers(&self) -> HashMap<String, String> {
        self.inner
            .lock()
            .unwrap()
            .items
            .front()
            .map(|item| item.headers.clone())
            .unwrap_or_default()
    }

    pub fn set_position(&self, offset: f64) {
        self.inner.lock().unwrap().position = offset;
    }

    /// Makes `advance_to_next` emit a position report for the item it is
    /// leaving, the way a real player flushes its last periodic update.
    pub fn report_position_on_advance(&self) {
        self.inner.lock().unwrap().report_on_advance = true;
    }

    /// Sends an event tagged with `queue`.
    pub fn send(&self, queue: QueueId, kind: EngineEventKind) {
        let inner = self.inner.lock().unwrap();
        let (_, sink) = inner.queue.as_ref().expect("no queue loaded");
        sink.send(EngineEvent::new(queue, kind)).unwrap();
    }

    /// Plays the current item to its end: drops it and reports the boundary.
    pub fn finish_current(&self) {
        let mut inner = self.inner.lock().unwrap();
        let ended = inner.items.pop_front().expect("queue is empty");
        inner.position = 0.0;
        let (queue, sink) = inner.queue.as_ref().expect("no queue loaded");
        sink.send(EngineEvent::new(
            *queue,
            EngineEventKind::TrackBoundary {
                ended_track: ended.track_index,
            },
        ))
        .unwrap();
    }

    fn install(&self, queue: QueueId, items: Vec<QueueItem>, events: EngineEventSink) {
        let mut inner = self.inner.lock().unwrap();
        inner.items = items.into();
        inner.position = 0.0;
        let kind = if inner.fail_prepare {
            EngineEventKind::Failed {
                message: "unsupported container".to_string(),
            }
        } else {
            EngineEventKind::Ready
        };
        events.send(EngineEvent::new(queue, kind)).unwrap();
        inner.queue = Some((queue, events));
    }

    fn record(&self, call: EngineCall) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl QueueEngine for FakeEngine {
    async fn load_queue(&self, queue: QueueId, items: Vec<QueueItem>, events: EngineEventSink) -> BridgeResult<()> {
        self.record(EngineCall::LoadQueue {
            first: items.first().map(|item| item.track_index).unwrap_or(0),
            len: items.len(),
        });
        self.install(queue, items, events);
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        self.record(EngineCall::Play);
        Ok(())
    }

    async fn pause_at_zero_rate(&self) -> BridgeResult<()> {
        self.record(EngineCall::Pause);
        Ok(())
    }

    async fn seek_within_current(&self, offset: f64) -> BridgeResult<()> {
        self.record(EngineCall::Seek(offset));
        self.inner.lock().unwrap().position = offset;
        Ok(())
    }

    async fn advance_to_next(&self) -> BridgeResult<()> {
        self.record(EngineCall::Advance);
        let mut inner = self.inner.lock().unwrap();
        let Some(left) = inner.items.pop_front() else {
            return Err(BridgeError::Engine("queue exhausted".to_string()));
        };
        if inner.report_on_advance {
            if let Some((queue, sink)) = inner.queue.as_ref() {
                sink.send(EngineEvent::new(
                    *queue,
                    EngineEventKind::TimeUpdate {
                        track_index: left.track_index,
                        offset: inner.position,
                    },
                ))
                .ok();
            }
        }
        inner.position = 0.0;
        Ok(())
    }

    async fn rebuild_from(
        &self,
        queue: QueueId,
        track_index: usize,
        items: Vec<QueueItem>,
        events: EngineEventSink,
    ) -> BridgeResult<()> {
        self.record(EngineCall::Rebuild {
            from: track_index,
            len: items.len(),
        });
        self.install(queue, items, events);
        Ok(())
    }

    async fn set_rate(&self, rate: f32) -> BridgeResult<()> {
        self.record(EngineCall::SetRate(rate));
        Ok(())
    }

    async fn current_item(&self) -> BridgeResult<Option<usize>> {
        Ok(self.inner.lock().unwrap().items.front().map(|item| item.track_index))
    }

    async fn position_in_current(&self) -> BridgeResult<f64> {
        Ok(self.inner.lock().unwrap().position)
    }

    async fn teardown(&self) -> BridgeResult<()> {
        self.record(EngineCall::Teardown);
        let mut inner = self.inner.lock().unwrap();
        inner.items.clear();
        inner.queue = None;
        Ok(())
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Default)]
struct ServerInner {
    details: HashMap<String, ItemDetails>,
    progress: HashMap<String, f64>,
    details_delay: Option<Duration>,
    start_delay: Option<Duration>,
    started: Vec<String>,
    syncs: Vec<(String, SessionSync)>,
    closes: Vec<(String, Option<SessionSync>)>,
    saved: Vec<(String, ProgressUpdate)>,
}

/// In-memory server that records every session and progress call.
#[derive(Clone, Default)]
pub struct FakeServer {
    inner: Arc<Mutex<ServerInner>>,
}

impl FakeServer {
    pub fn with_item(details: ItemDetails) -> Self {
        let server = Self::default();
        server.add_item(details);
        server
    }

    pub fn add_item(&self, details: ItemDetails) {
        self.inner
            .lock()
            .unwrap()
            .details
            .insert(details.id.clone(), details);
    }

    pub fn set_progress(&self, item_id: &str, current_time: f64) {
        self.inner
            .lock()
            .unwrap()
            .progress
            .insert(item_id.to_string(), current_time);
    }

    pub fn delay_details(&self, delay: Duration) {
        self.inner.lock().unwrap().details_delay = Some(delay);
    }

    pub fn delay_session_start(&self, delay: Duration) {
        self.inner.lock().unwrap().start_delay = Some(delay);
    }

    pub fn started(&self) -> Vec<String> {
        self.inner.lock().unwrap().started.clone()
    }

    pub fn syncs(&self) -> Vec<(String, SessionSync)> {
        self.inner.lock().unwrap().syncs.clone()
    }

    pub fn closes(&self) -> Vec<(String, Option<SessionSync>)> {
        self.inner.lock().unwrap().closes.clone()
    }

    pub fn saved(&self) -> Vec<(String, ProgressUpdate)> {
        self.inner.lock().unwrap().saved.clone()
    }
}

#[async_trait]
impl MediaServer for FakeServer {
    async fn fetch_item_details(&self, item_id: &str) -> BridgeResult<ItemDetails> {
        let delay = self.inner.lock().unwrap().details_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner
            .lock()
            .unwrap()
            .details
            .get(item_id)
            .cloned()
            .ok_or_else(|| BridgeError::Http {
                status: 404,
                message: format!("item {item_id} not found"),
            })
    }

    async fn start_session(&self, item_id: &str) -> BridgeResult<StartedSession> {
        let delay = self.inner.lock().unwrap().start_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.started.push(item_id.to_string());
        Ok(StartedSession {
            session_id: format!("sess-{}", inner.started.len()),
            audio_tracks: Vec::new(),
        })
    }

    async fn sync_session(&self, session_id: &str, sync: SessionSync) -> BridgeResult<()> {
        self.inner
            .lock()
            .unwrap()
            .syncs
            .push((session_id.to_string(), sync));
        Ok(())
    }

    async fn close_session(&self, session_id: &str, sync: Option<SessionSync>) -> BridgeResult<()> {
        self.inner
            .lock()
            .unwrap()
            .closes
            .push((session_id.to_string(), sync));
        Ok(())
    }

    async fn load_progress(&self, item_id: &str) -> BridgeResult<Option<f64>> {
        Ok(self.inner.lock().unwrap().progress.get(item_id).copied())
    }

    async fn save_progress(&self, item_id: &str, update: ProgressUpdate) -> BridgeResult<()> {
        self.inner
            .lock()
            .unwrap()
            .saved
            .push((item_id.to_string(), update));
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn track(index: usize, start_offset: f64, duration: f64) -> RemoteTrack {
    RemoteTrack {
        index,
        start_offset,
        duration,
        title: format!("Chapter {}", index + 1),
        content_url: format!("https://abs.test/api/items/li_1/file/{index}"),
        mime_type: "audio/mpeg".to_string(),
    }
}

pub fn book(item_id: &str, durations: &[f64]) -> ItemDetails {
    let mut start = 0.0;
    let tracks = durations
        .iter()
        .enumerate()
        .map(|(index, &duration)| {
            let track = track(index, start, duration);
            start += duration;
            track
        })
        .collect();

    ItemDetails {
        id: item_id.to_string(),
        title: format!("Book {item_id}"),
        tracks,
        audio_files: Vec::new(),
        duration: Some(start),
    }
}

pub fn audio_file(index: usize, duration: f64) -> RemoteAudioFile {
    RemoteAudioFile {
        index,
        duration,
        title: format!("Part {index}"),
        content_url: format!("https://abs.test/api/items/li_2/file/{index}"),
        mime_type: "audio/mp4".to_string(),
    }
}

/// Wall-clock time every harness clock reports, in epoch milliseconds.
pub const HARNESS_NOW_MS: i64 = 1_714_564_800_000;

pub fn harness_clock() -> Arc<FixedClock> {
    let now = DateTime::<Utc>::from_timestamp_millis(HARNESS_NOW_MS).unwrap_or_default();
    Arc::new(FixedClock::new(now))
}

pub struct Harness {
    pub handle: PlaybackHandle,
    pub engine: FakeEngine,
    pub server: FakeServer,
    pub settings: Arc<InMemorySettingsStore>,
}

pub fn harness(server: FakeServer) -> Harness {
    harness_with(FakeEngine::default(), server, Arc::new(InMemorySettingsStore::new()))
}

pub fn harness_with(
    engine: FakeEngine,
    server: FakeServer,
    settings: Arc<InMemorySettingsStore>,
) -> Harness {
    let mut media_headers = HashMap::new();
    media_headers.insert("Authorization".to_string(), "Bearer test-token".to_string());

    let handle = spawn(PlaybackDeps {
        engine: Arc::new(engine.clone()),
        server: Arc::new(server.clone()),
        settings: settings.clone() as Arc<dyn SettingsStore>,
        clock: harness_clock(),
        events: EventBus::new(256),
        tuning: PlaybackTuning::default(),
        media_headers,
    })
    .unwrap();

    Harness {
        handle,
        engine,
        server,
        settings,
    }
}

/// Lets the post-boundary settle delay elapse.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(600)).await;
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
