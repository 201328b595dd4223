//! # Playback Coordinator
//!
//! A single task owns all playback state. User commands, engine callbacks,
//! network completions and timers are funnelled into one `select!` loop, so a
//! track boundary racing a seek is always applied in some total order and
//! never interleaved.
//!
//! ## Inputs
//!
//! - Commands from [`PlaybackHandle`]s (answered through a oneshot)
//! - [`EngineEvent`]s tagged with the [`QueueId`] they belong to
//! - Completions of spawned network work (item details, session start)
//! - Session-sync, durable-progress and sleep timers
//! - The post-boundary settle deadline
//!
//! ## Cancellation
//!
//! Every `load` bumps a generation; completions from older generations are
//! dropped. Every queue handed to the engine gets a fresh `QueueId`; events
//! carrying any other id are dropped. Timers are `Option<Interval>` and are
//! dropped (not paused) when playback stops, so nothing fires after teardown.

use crate::error::{PlaybackError, Result};
use crate::handle::{Ack, Command, PlaybackHandle};
use crate::playlist::Playlist;
use crate::session::{progress_update, SessionManager, StartOutcome, StartResolution};
use crate::sleep_timer::{SleepTick, SleepTimer};
use crate::state::{LoadingStatus, PlaybackSnapshot, PlayerState};
use crate::timeline::{self, Navigation};
use bridge_traits::{
    BridgeError, Clock, EngineEvent, EngineEventKind, ItemDetails, MediaServer, QueueEngine,
    QueueId, SettingsStore,
};
use core_runtime::config::PlaybackTuning;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Settings key holding the preferred playback rate.
pub const RATE_SETTING_KEY: &str = "playback.rate";

/// Collaborators injected into the coordinator.
#[derive(Clone)]
pub struct PlaybackDeps {
    pub engine: Arc<dyn QueueEngine>,
    pub server: Arc<dyn MediaServer>,
    pub settings: Arc<dyn SettingsStore>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    pub tuning: PlaybackTuning,
    /// Headers the engine must send when fetching track content.
    pub media_headers: HashMap<String, String>,
}

/// Spawns the coordinator task and returns a handle to it.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// [`PlaybackError::Configuration`] when `deps.tuning` does not validate.
pub fn spawn(deps: PlaybackDeps) -> Result<PlaybackHandle> {
    deps.tuning.validate()?;

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(PlaybackSnapshot::default());
    let events = deps.events.clone();

    let coordinator = PlaybackCoordinator::new(deps, command_rx, snapshot_tx);
    tokio::spawn(coordinator.run());

    Ok(PlaybackHandle::new(command_tx, snapshot_rx, events))
}

/// Result of the detached load fetch.
struct FetchedItem {
    details: ItemDetails,
    server_progress: Option<f64>,
    stored_rate: Option<f32>,
}

enum Completion {
    Loaded {
        generation: u64,
        outcome: Result<FetchedItem>,
    },
    SessionStarted(StartOutcome),
}

/// A track boundary waiting for the engine to settle.
#[derive(Debug, Clone, Copy)]
struct PendingBoundary {
    deadline: Instant,
    queue: QueueId,
    ended_track: usize,
    was_playing: bool,
}

struct PlaybackCoordinator {
    engine: Arc<dyn QueueEngine>,
    server: Arc<dyn MediaServer>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    tuning: PlaybackTuning,
    media_headers: HashMap<String, String>,
    session: SessionManager,

    commands: mpsc::UnboundedReceiver<Command>,
    engine_tx: mpsc::UnboundedSender<EngineEvent>,
    engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    snapshot_tx: watch::Sender<PlaybackSnapshot>,

    state: PlayerState,
    is_playing: bool,
    item_id: Option<String>,
    playlist: Option<Playlist>,
    queue: Option<QueueId>,
    generation: u64,
    load_ack: Option<Ack>,
    play_when_ready: bool,
    /// Track the engine's current item corresponds to.
    engine_track: usize,
    current_time: f64,
    pending_resume: Option<f64>,
    rate: f32,
    has_audio_stream: bool,
    loading_status: LoadingStatus,
    sleep: Option<SleepTimer>,

    sync_timer: Option<Interval>,
    progress_timer: Option<Interval>,
    sleep_ticker: Option<Interval>,
    settle: Option<PendingBoundary>,
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}

fn periodic(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn fetch_item(
    server: Arc<dyn MediaServer>,
    settings: Arc<dyn SettingsStore>,
    item_id: String,
    want_progress: bool,
) -> Result<FetchedItem> {
    let details = server
        .fetch_item_details(&item_id)
        .await
        .map_err(PlaybackError::from_server)?;

    let server_progress = if want_progress {
        match server.load_progress(&item_id).await {
            Ok(progress) => progress,
            Err(err) => {
                warn!(item_id = %item_id, error = %err, "Could not load saved progress");
                None
            }
        }
    } else {
        None
    };

    let stored_rate = match settings.get_f64(RATE_SETTING_KEY).await {
        Ok(rate) => rate.map(|rate| rate as f32),
        Err(err) => {
            warn!(error = %err, "Could not read rate preference");
            None
        }
    };

    Ok(FetchedItem {
        details,
        server_progress,
        stored_rate,
    })
}

impl PlaybackCoordinator {
    fn new(
        deps: PlaybackDeps,
        commands: mpsc::UnboundedReceiver<Command>,
        snapshot_tx: watch::Sender<PlaybackSnapshot>,
    ) -> Self {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let session = SessionManager::new(Arc::clone(&deps.server), deps.events.clone());

        Self {
            engine: deps.engine,
            server: deps.server,
            settings: deps.settings,
            clock: deps.clock,
            events: deps.events,
            tuning: deps.tuning,
            media_headers: deps.media_headers,
            session,
            commands,
            engine_tx,
            engine_rx,
            completions_tx,
            completions_rx,
            snapshot_tx,
            state: PlayerState::Idle,
            is_playing: false,
            item_id: None,
            playlist: None,
            queue: None,
            generation: 0,
            load_ack: None,
            play_when_ready: false,
            engine_track: 0,
            current_time: 0.0,
            pending_resume: None,
            rate: 1.0,
            has_audio_stream: false,
            loading_status: LoadingStatus::Idle,
            sleep: None,
            sync_timer: None,
            progress_timer: None,
            sleep_ticker: None,
            settle: None,
        }
    }

    async fn run(mut self) {
        info!("Playback coordinator started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Teardown(ack)) => {
                        self.teardown().await;
                        ack.send(Ok(())).ok();
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All playback handles dropped");
                        self.teardown().await;
                        break;
                    }
                },
                Some(event) = self.engine_rx.recv() => self.handle_engine_event(event).await,
                Some(completion) = self.completions_rx.recv() => self.handle_completion(completion).await,
                _ = tick(&mut self.sync_timer) => self.on_sync_tick().await,
                _ = tick(&mut self.progress_timer) => self.on_progress_tick().await,
                _ = tick(&mut self.sleep_ticker) => self.on_sleep_tick().await,
                _ = deadline(self.settle.map(|b| b.deadline)) => self.on_settled().await,
            }
        }

        info!("Playback coordinator stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        let (ack, result) = match command {
            Command::Load {
                item_id,
                start_time,
                ack,
            } => {
                self.load(item_id, start_time, ack).await;
                return;
            }
            Command::Play(ack) => (ack, self.play().await),
            Command::Pause(ack) => (ack, self.pause().await),
            Command::TogglePlayPause(ack) => (ack, self.toggle_play_pause().await),
            Command::Seek { to, ack } => (ack, self.seek(to).await),
            Command::Skip { by, ack } => (ack, self.skip(by).await),
            Command::NextChapter(ack) => (ack, self.next_chapter().await),
            Command::PreviousChapter(ack) => (ack, self.previous_chapter().await),
            Command::SetRate { rate, ack } => (ack, self.set_rate(rate).await),
            Command::ToggleRate(ack) => {
                let rate = self.tuning.next_preset(self.rate);
                (ack, self.set_rate(rate).await)
            }
            Command::SetSleep { minutes, ack } => {
                self.set_sleep(minutes);
                (ack, Ok(()))
            }
            Command::CancelSleepTimer(ack) => {
                self.cancel_sleep_timer();
                (ack, Ok(()))
            }
            Command::Teardown(ack) => {
                // Handled by the run loop; kept exhaustive
                self.teardown().await;
                (ack, Ok(()))
            }
        };

        self.publish();
        ack.send(result).ok();
    }

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Loaded {
                generation,
                outcome,
            } => self.on_item_fetched(generation, outcome).await,
            Completion::SessionStarted(outcome) => {
                let resolution =
                    self.session
                        .complete_start(outcome, Instant::now(), self.is_playing);
                if let StartResolution::Orphaned { session_id } = resolution {
                    debug!(session_id = %session_id, "Session start outlived its load");
                }
            }
        }
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    fn duration(&self) -> f64 {
        self.playlist
            .as_ref()
            .map(Playlist::total_duration)
            .unwrap_or(0.0)
    }

    /// Track shown to observers. Before the first play this is the track the
    /// pending resume will land on, not the engine's first item.
    fn display_track(&self) -> usize {
        match (self.pending_resume, self.playlist.as_ref()) {
            (Some(resume), Some(playlist)) => timeline::locate(playlist, resume).track_index,
            _ => self.engine_track,
        }
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        let track_index = self.display_track();
        let track = self
            .playlist
            .as_ref()
            .and_then(|playlist| playlist.track(track_index));

        PlaybackSnapshot {
            item_id: self.item_id.clone(),
            state: self.state,
            is_playing: self.is_playing,
            current_time: self.current_time,
            duration: self.duration(),
            rate: self.rate,
            current_track_index: track_index,
            current_track_title: track.map(|t| t.title.clone()),
            has_audio_stream: self.has_audio_stream,
            current_chapter_start: track.map(|t| t.start_offset).unwrap_or(0.0),
            current_chapter_duration: track.map(|t| t.duration).unwrap_or(0.0),
            sleep_remaining: self.sleep.as_ref().map(SleepTimer::remaining),
            loading_status: self.loading_status.clone(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine
        self.events.emit(CoreEvent::Playback(event)).ok();
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn start_session_timers(&mut self) {
        self.sync_timer = Some(periodic(self.tuning.session_sync_interval()));
        self.progress_timer = Some(periodic(self.tuning.progress_save_interval()));
    }

    fn stop_session_timers(&mut self) {
        self.sync_timer = None;
        self.progress_timer = None;
    }

    async fn on_sync_tick(&mut self) {
        if !self.is_playing {
            return;
        }
        self.refresh_position().await;
        self.session
            .sync(Instant::now(), self.current_time, self.duration());
    }

    async fn on_progress_tick(&mut self) {
        if !self.is_playing {
            return;
        }
        self.refresh_position().await;
        self.save_progress();
        self.session
            .sync(Instant::now(), self.current_time, self.duration());
    }

    fn save_progress(&self) {
        if let Some(item_id) = self.item_id.as_deref() {
            let update = progress_update(
                self.current_time,
                self.duration(),
                self.tuning.finished_threshold,
                self.clock.unix_timestamp_millis(),
            );
            self.session.save_progress(item_id, update);
        }
    }

    /// One immediate pass: session sync when a session is open, durable
    /// progress otherwise.
    fn force_sync(&mut self) {
        if !self
            .session
            .sync(Instant::now(), self.current_time, self.duration())
        {
            self.save_progress();
        }
    }

    fn set_sleep(&mut self, minutes: u32) {
        match SleepTimer::from_minutes(minutes) {
            Some(timer) => {
                info!(minutes, "Sleep timer set");
                self.sleep = Some(timer);
                self.sleep_ticker = Some(periodic(self.tuning.sleep_tick()));
            }
            None => self.cancel_sleep_timer(),
        }
    }

    fn cancel_sleep_timer(&mut self) {
        if self.sleep.take().is_some() {
            debug!("Sleep timer cancelled");
        }
        self.sleep_ticker = None;
    }

    async fn on_sleep_tick(&mut self) {
        let Some(timer) = self.sleep.as_mut() else {
            self.sleep_ticker = None;
            return;
        };

        if timer.tick() == SleepTick::Expired {
            info!("Sleep timer expired");
            self.cancel_sleep_timer();
            if let Err(err) = self.pause().await {
                warn!(error = %err, "Pause on sleep timer failed");
            }
            if let Some(item_id) = self.item_id.clone() {
                self.emit(PlaybackEvent::SleepTimerFired { item_id });
            }
        }
        self.publish();
    }

    // ========================================================================
    // Engine
    // ========================================================================

    /// Logs an engine failure and marks the stream unusable.
    fn engine_failure(&mut self, operation: &str, err: BridgeError) -> PlaybackError {
        warn!(operation, error = %err, "Engine call failed");
        self.has_audio_stream = false;
        PlaybackError::from_engine(err)
    }

    /// Pulls the engine's position while playing.
    async fn refresh_position(&mut self) {
        if !self.is_playing || self.settle.is_some() {
            return;
        }
        let Some(playlist) = self.playlist.as_ref() else {
            return;
        };

        match self.engine.position_in_current().await {
            Ok(offset) => {
                let time = timeline::absolute_time(playlist, self.engine_track, offset.max(0.0));
                self.current_time = time.clamp(0.0, playlist.total_duration());
            }
            Err(err) => warn!(error = %err, "Could not read engine position"),
        }
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        if self.queue != Some(event.queue) {
            debug!(queue = %event.queue, "Ignoring event from a retired queue");
            return;
        }

        match event.kind {
            EngineEventKind::Ready => self.on_engine_ready().await,
            EngineEventKind::Failed { message } => self.on_engine_failed(message),
            EngineEventKind::TrackBoundary { ended_track } => {
                self.on_track_boundary(event.queue, ended_track)
            }
            EngineEventKind::TimeUpdate {
                track_index,
                offset,
            } => {
                if self.pending_resume.is_some()
                    || self.settle.is_some()
                    || self.state == PlayerState::SwitchingTrack
                    || !self.state.has_queue()
                {
                    return;
                }
                // Reports queued before a forward advance belong to the item
                // that was left behind.
                if track_index != self.engine_track {
                    debug!(
                        track_index,
                        current = self.engine_track,
                        "Ignoring position report for a previous item"
                    );
                    return;
                }
                if let Some(playlist) = self.playlist.as_ref() {
                    self.current_time = timeline::absolute_time(playlist, self.engine_track, offset)
                        .clamp(0.0, playlist.total_duration());
                    self.publish();
                }
            }
        }
    }

    async fn on_engine_ready(&mut self) {
        self.has_audio_stream = true;

        if self.state != PlayerState::Loading {
            self.publish();
            return;
        }

        self.state = PlayerState::Ready;
        self.loading_status = LoadingStatus::Ready;
        if let Some(ack) = self.load_ack.take() {
            ack.send(Ok(())).ok();
        }

        if let (Some(item_id), Some(playlist)) = (self.item_id.clone(), self.playlist.as_ref()) {
            info!(
                item_id = %item_id,
                track_count = playlist.len(),
                duration = playlist.total_duration(),
                "Item ready"
            );
            self.emit(PlaybackEvent::ItemLoaded {
                item_id,
                track_count: playlist.len(),
                duration: playlist.total_duration(),
            });
        }
        self.publish();

        if std::mem::take(&mut self.play_when_ready) {
            if let Err(err) = self.play().await {
                warn!(error = %err, "Deferred play failed");
            }
            self.publish();
        }
    }

    fn on_engine_failed(&mut self, message: String) {
        if self.state == PlayerState::Loading {
            warn!(error = %message, "Engine could not prepare the queue");
            let item_id = self.item_id.clone().unwrap_or_default();
            self.fail_load(PlaybackError::NoPlayableAudio(item_id));
            return;
        }

        warn!(error = %message, state = ?self.state, "Engine failed during playback");
        let was_playing = self.is_playing;
        self.has_audio_stream = false;
        self.is_playing = false;
        self.stop_session_timers();
        self.settle = None;
        if self.state.has_queue() {
            self.state = PlayerState::Failed;
        }
        if was_playing {
            self.force_sync();
        }
        self.emit(PlaybackEvent::Error {
            item_id: self.item_id.clone(),
            message,
            recoverable: true,
        });
        self.publish();
    }

    fn on_track_boundary(&mut self, queue: QueueId, ended_track: usize) {
        if !self.state.has_queue() || ended_track != self.engine_track {
            debug!(
                ended_track,
                engine_track = self.engine_track,
                "Ignoring stale track boundary"
            );
            return;
        }

        debug!(ended_track, "Track boundary, waiting for engine to settle");
        self.settle = Some(PendingBoundary {
            deadline: Instant::now() + self.tuning.track_settle_delay(),
            queue,
            ended_track,
            was_playing: self.is_playing,
        });
    }

    async fn on_settled(&mut self) {
        let Some(boundary) = self.settle.take() else {
            return;
        };
        if self.queue != Some(boundary.queue) || self.engine_track != boundary.ended_track {
            debug!("Boundary superseded while settling");
            return;
        }

        match self.engine.current_item().await {
            Ok(Some(track_index)) => {
                self.engine_track = track_index;
                let offset = match self.engine.position_in_current().await {
                    Ok(offset) => offset.max(0.0),
                    Err(err) => {
                        warn!(error = %err, "Could not read engine position");
                        0.0
                    }
                };
                if let Some(playlist) = self.playlist.as_ref() {
                    self.current_time = timeline::absolute_time(playlist, track_index, offset)
                        .clamp(0.0, playlist.total_duration());
                }

                // Advancing can leave the new item running at its default rate
                if boundary.was_playing && self.is_playing {
                    if let Err(err) = self.engine.set_rate(self.rate).await {
                        self.engine_failure("set_rate", err);
                    }
                }

                self.emit_track_changed();
                self.publish();
            }
            Ok(None) => self.finish().await,
            Err(err) => {
                self.engine_failure("current_item", err);
                self.publish();
            }
        }
    }

    fn emit_track_changed(&self) {
        let (Some(item_id), Some(track)) = (
            self.item_id.clone(),
            self.playlist
                .as_ref()
                .and_then(|playlist| playlist.track(self.engine_track)),
        ) else {
            return;
        };

        info!(item_id = %item_id, track_index = track.index, "Track changed");
        self.emit(PlaybackEvent::TrackChanged {
            item_id,
            track_index: track.index,
            title: track.title.clone(),
        });
    }

    /// The engine ran out of items.
    async fn finish(&mut self) {
        info!(item_id = ?self.item_id, "Reached end of item");
        self.state = PlayerState::Ended;
        self.is_playing = false;
        self.stop_session_timers();
        self.current_time = self.duration();
        self.engine_track = self.playlist.as_ref().map(Playlist::last_index).unwrap_or(0);

        self.save_progress();
        self.session
            .sync(Instant::now(), self.current_time, self.duration());

        if let Some(item_id) = self.item_id.clone() {
            self.emit(PlaybackEvent::Ended { item_id });
        }
        self.publish();
    }

    // ========================================================================
    // Load
    // ========================================================================

    #[instrument(skip(self, ack))]
    async fn load(&mut self, item_id: String, start_time: Option<f64>, ack: Ack) {
        self.refresh_position().await;

        self.generation += 1;
        let generation = self.generation;

        if let Some(previous) = self.load_ack.take() {
            let superseded = self.item_id.clone().unwrap_or_default();
            previous.send(Err(PlaybackError::Superseded(superseded))).ok();
        }

        if self
            .session
            .item_id()
            .is_some_and(|session_item| session_item != item_id)
        {
            self.session
                .close_detached(Instant::now(), self.current_time, self.duration());
        }

        self.stop_session_timers();
        self.settle = None;
        if self.queue.take().is_some() {
            if let Err(err) = self.engine.teardown().await {
                warn!(error = %err, "Engine teardown failed");
            }
        }

        info!(item_id = %item_id, start_time = ?start_time, "Loading item");
        self.state = PlayerState::Loading;
        self.is_playing = false;
        self.playlist = None;
        self.engine_track = 0;
        self.pending_resume = start_time.map(|t| t.max(0.0));
        self.current_time = self.pending_resume.unwrap_or(0.0);
        self.has_audio_stream = false;
        self.loading_status = LoadingStatus::Loading;
        self.play_when_ready = false;
        self.item_id = Some(item_id.clone());
        self.load_ack = Some(ack);
        self.publish();

        let server = Arc::clone(&self.server);
        let settings = Arc::clone(&self.settings);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let outcome = fetch_item(server, settings, item_id, start_time.is_none()).await;
            completions
                .send(Completion::Loaded {
                    generation,
                    outcome,
                })
                .ok();
        });
    }

    async fn on_item_fetched(&mut self, generation: u64, outcome: Result<FetchedItem>) {
        if generation != self.generation || self.state != PlayerState::Loading {
            debug!(generation, current = self.generation, "Discarding stale load result");
            return;
        }

        let (fetched, playlist) = match outcome
            .and_then(|fetched| Playlist::from_details(&fetched.details).map(|p| (fetched, p)))
        {
            Ok(built) => built,
            Err(err) => {
                self.fail_load(err);
                return;
            }
        };

        if let Some(rate) = fetched.stored_rate {
            self.rate = self.tuning.clamp_rate(rate);
        }
        if self.pending_resume.is_none() {
            self.pending_resume = fetched
                .server_progress
                .map(|progress| (progress - self.tuning.resume_rewind_secs).max(0.0));
        }
        self.pending_resume = self
            .pending_resume
            .map(|resume| resume.min(playlist.total_duration()));
        self.current_time = self.pending_resume.unwrap_or(0.0);

        let queue = QueueId::new();
        let items = playlist.queue_items(0, &self.media_headers);
        self.playlist = Some(playlist);
        self.queue = Some(queue);
        self.engine_track = 0;
        self.publish();

        debug!(queue = %queue, pending_resume = ?self.pending_resume, "Handing queue to engine");
        if let Err(err) = self
            .engine
            .load_queue(queue, items, self.engine_tx.clone())
            .await
        {
            warn!(error = %err, "Engine rejected the queue");
            let item_id = self.item_id.clone().unwrap_or_default();
            self.fail_load(PlaybackError::NoPlayableAudio(item_id));
        }
    }

    fn fail_load(&mut self, err: PlaybackError) {
        warn!(item_id = ?self.item_id, error = %err, "Load failed");
        self.state = PlayerState::Failed;
        self.is_playing = false;
        self.has_audio_stream = false;
        self.play_when_ready = false;
        self.loading_status = if err.is_network_error() {
            LoadingStatus::NetworkError(err.to_string())
        } else {
            LoadingStatus::NoPlayableAudio
        };

        self.emit(PlaybackEvent::Error {
            item_id: self.item_id.clone(),
            message: err.to_string(),
            recoverable: true,
        });
        if let Some(ack) = self.load_ack.take() {
            ack.send(Err(err)).ok();
        }
        self.publish();
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn play(&mut self) -> Result<()> {
        match self.state {
            PlayerState::Idle => {
                debug!("Play ignored, nothing loaded");
                Ok(())
            }
            PlayerState::Loading => {
                debug!("Play requested while loading, deferring");
                self.play_when_ready = true;
                Ok(())
            }
            PlayerState::Failed => Err(PlaybackError::NoPlayableAudio(
                self.item_id.clone().unwrap_or_default(),
            )),
            PlayerState::Playing | PlayerState::SwitchingTrack => Ok(()),
            PlayerState::Ended => {
                // The queue is exhausted; rebuild it
                let target = self.pending_resume.unwrap_or(0.0);
                self.navigate(target, true).await?;
                self.start_playing().await
            }
            PlayerState::Ready | PlayerState::Paused => {
                if let Some(resume) = self.pending_resume {
                    debug!(resume, "Applying pending resume");
                    self.navigate(resume, false).await?;
                }
                self.start_playing().await
            }
        }
    }

    async fn start_playing(&mut self) -> Result<()> {
        if let Err(err) = self.engine.play().await {
            return Err(self.engine_failure("play", err));
        }
        if let Err(err) = self.engine.set_rate(self.rate).await {
            return Err(self.engine_failure("set_rate", err));
        }

        self.state = PlayerState::Playing;
        self.is_playing = true;

        let now = Instant::now();
        self.session.resume(now);
        if let Some(item_id) = self.item_id.clone() {
            let completions = self.completions_tx.clone();
            self.session.ensure_started(&item_id, now, move |outcome| {
                completions.send(Completion::SessionStarted(outcome)).is_ok()
            });
            info!(item_id = %item_id, position = self.current_time, "Playback started");
            self.emit(PlaybackEvent::Started {
                item_id,
                position: self.current_time,
            });
        }
        self.start_session_timers();
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        match self.state {
            PlayerState::Loading => {
                self.play_when_ready = false;
                Ok(())
            }
            PlayerState::Playing | PlayerState::SwitchingTrack if self.is_playing => {
                self.refresh_position().await;
                let result = self.engine.pause_at_zero_rate().await;

                self.state = PlayerState::Paused;
                self.is_playing = false;
                self.stop_session_timers();
                self.force_sync();

                if let Some(item_id) = self.item_id.clone() {
                    info!(item_id = %item_id, position = self.current_time, "Playback paused");
                    self.emit(PlaybackEvent::Paused {
                        item_id,
                        position: self.current_time,
                    });
                }

                result.map_err(|err| self.engine_failure("pause_at_zero_rate", err))
            }
            _ => Ok(()),
        }
    }

    async fn toggle_play_pause(&mut self) -> Result<()> {
        match self.state {
            PlayerState::Loading => {
                self.play_when_ready = !self.play_when_ready;
                Ok(())
            }
            _ if self.is_playing => self.pause().await,
            _ => self.play().await,
        }
    }

    async fn set_rate(&mut self, rate: f32) -> Result<()> {
        let rate = self.tuning.clamp_rate(rate);
        self.rate = rate;
        debug!(rate, "Playback rate set");

        let settings = Arc::clone(&self.settings);
        tokio::spawn(async move {
            if let Err(err) = settings.set_f64(RATE_SETTING_KEY, f64::from(rate)).await {
                warn!(error = %err, "Could not persist rate preference");
            }
        });
        self.emit(PlaybackEvent::RateChanged { rate });

        // Paused playback stays pinned at rate 0
        if self.is_playing {
            if let Err(err) = self.engine.set_rate(rate).await {
                return Err(self.engine_failure("set_rate", err));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    async fn seek(&mut self, to: f64) -> Result<()> {
        match self.state {
            PlayerState::Idle => Ok(()),
            PlayerState::Loading | PlayerState::Ended | PlayerState::Failed => {
                let target = if to.is_nan() { 0.0 } else { to.max(0.0) };
                let target = match self.playlist.as_ref() {
                    Some(playlist) => target.min(playlist.total_duration()),
                    None => target,
                };
                debug!(target, state = ?self.state, "Seek stored for next play");
                self.pending_resume = Some(target);
                self.current_time = target;
                Ok(())
            }
            _ => self.navigate(to, false).await,
        }
    }

    async fn skip(&mut self, by: f64) -> Result<()> {
        self.refresh_position().await;
        self.seek(self.current_time + by).await
    }

    async fn next_chapter(&mut self) -> Result<()> {
        let next_start = self
            .playlist
            .as_ref()
            .and_then(|playlist| playlist.track(self.display_track() + 1))
            .map(|track| track.start_offset);
        match next_start {
            Some(start) => self.seek(start).await,
            None => {
                debug!("Already on the last chapter");
                Ok(())
            }
        }
    }

    async fn previous_chapter(&mut self) -> Result<()> {
        self.refresh_position().await;
        let Some(playlist) = self.playlist.as_ref() else {
            return Ok(());
        };

        let track_index = self.display_track();
        let current_start = playlist
            .track(track_index)
            .map(|track| track.start_offset)
            .unwrap_or(0.0);
        let elapsed = self.current_time - current_start;

        let target = if elapsed > self.tuning.previous_restart_threshold_secs || track_index == 0 {
            current_start
        } else {
            playlist
                .track(track_index - 1)
                .map(|track| track.start_offset)
                .unwrap_or(0.0)
        };
        self.seek(target).await
    }

    /// Moves the engine to `target` using the cheapest primitive the queue
    /// allows. Observable track fields change before any engine call.
    async fn navigate(&mut self, target: f64, mut force_rebuild: bool) -> Result<()> {
        if self.playlist.is_none() {
            return Ok(());
        }

        // The engine already moved past a boundary that has not settled yet
        if self.settle.take().is_some() {
            match self.engine.current_item().await {
                Ok(Some(track_index)) => self.engine_track = track_index,
                Ok(None) => force_rebuild = true,
                Err(err) => {
                    self.engine_failure("current_item", err);
                    force_rebuild = true;
                }
            }
        }

        let Some(playlist) = self.playlist.as_ref() else {
            return Ok(());
        };

        let position = timeline::locate(playlist, target);
        let absolute = timeline::absolute_time(playlist, position.track_index, position.offset);
        let navigation = if force_rebuild {
            Navigation::Rebuild {
                track_index: position.track_index,
                offset: position.offset,
            }
        } else {
            timeline::plan(self.engine_track, position)
        };

        debug!(
            target = absolute,
            from_track = self.engine_track,
            navigation = ?navigation,
            "Seeking"
        );

        let resume_state = match self.state {
            PlayerState::Ended => PlayerState::Paused,
            state => state,
        };

        self.pending_resume = None;
        self.current_time = absolute;
        self.engine_track = position.track_index;

        if navigation.crosses_tracks() {
            self.state = PlayerState::SwitchingTrack;
            self.publish();
        }

        let result = self.drive_engine(navigation).await;
        self.state = resume_state;
        if navigation.crosses_tracks() {
            self.emit_track_changed();
        }
        result
    }

    async fn drive_engine(&mut self, navigation: Navigation) -> Result<()> {
        let outcome = match navigation {
            Navigation::WithinCurrent { offset } => self
                .engine
                .seek_within_current(offset)
                .await
                .map_err(|err| ("seek_within_current", err)),
            Navigation::Advance { steps, offset } => self.advance(steps, offset).await,
            Navigation::Rebuild {
                track_index,
                offset,
            } => self.rebuild(track_index, offset).await,
        };

        outcome.map_err(|(operation, err)| self.engine_failure(operation, err))
    }

    async fn advance(
        &mut self,
        steps: usize,
        offset: f64,
    ) -> std::result::Result<(), (&'static str, BridgeError)> {
        for _ in 0..steps {
            self.engine
                .advance_to_next()
                .await
                .map_err(|err| ("advance_to_next", err))?;
        }
        self.engine
            .seek_within_current(offset)
            .await
            .map_err(|err| ("seek_within_current", err))?;

        if self.is_playing {
            self.engine
                .set_rate(self.rate)
                .await
                .map_err(|err| ("set_rate", err))?;
        }
        Ok(())
    }

    async fn rebuild(
        &mut self,
        track_index: usize,
        offset: f64,
    ) -> std::result::Result<(), (&'static str, BridgeError)> {
        let items = self
            .playlist
            .as_ref()
            .map(|playlist| playlist.queue_items(track_index, &self.media_headers))
            .unwrap_or_default();

        // Retire the old queue before the engine can emit for the new one
        let queue = QueueId::new();
        self.queue = Some(queue);

        self.engine
            .rebuild_from(queue, track_index, items, self.engine_tx.clone())
            .await
            .map_err(|err| ("rebuild_from", err))?;
        self.has_audio_stream = true;
        self.engine
            .seek_within_current(offset)
            .await
            .map_err(|err| ("seek_within_current", err))?;

        if self.is_playing {
            self.engine.play().await.map_err(|err| ("play", err))?;
            self.engine
                .set_rate(self.rate)
                .await
                .map_err(|err| ("set_rate", err))?;
        } else {
            self.engine
                .pause_at_zero_rate()
                .await
                .map_err(|err| ("pause_at_zero_rate", err))?;
        }
        Ok(())
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    async fn teardown(&mut self) {
        info!(item_id = ?self.item_id, "Tearing down playback");
        self.refresh_position().await;

        self.stop_session_timers();
        self.cancel_sleep_timer();
        self.settle = None;
        self.generation += 1;

        self.session
            .close(Instant::now(), self.current_time, self.duration())
            .await;

        if self.queue.take().is_some() {
            if let Err(err) = self.engine.teardown().await {
                warn!(error = %err, "Engine teardown failed");
            }
        }

        if let Some(ack) = self.load_ack.take() {
            ack.send(Err(PlaybackError::CoordinatorStopped)).ok();
        }

        self.state = PlayerState::Idle;
        self.is_playing = false;
        self.item_id = None;
        self.playlist = None;
        self.pending_resume = None;
        self.current_time = 0.0;
        self.engine_track = 0;
        self.has_audio_stream = false;
        self.loading_status = LoadingStatus::Idle;
        self.publish();
    }
}
