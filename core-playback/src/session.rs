//! Session synchronization.
//!
//! Owns the remote listening session for the loaded item and the delta
//! accounting sent with each sync. Network calls run as detached tasks; only
//! session start reports back, because its result (the session id) mutates
//! coordinator state.
//!
//! Time listened is measured on the wall clock since the previous sync, so
//! seeking never inflates or deflates it. The clock restarts on resume so a
//! pause is never reported as listening.

use bridge_traits::{MediaServer, ProgressUpdate, SessionSync, StartedSession};
use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// A listening session opened on the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub session_id: String,
    pub item_id: String,
    pub started_at: Instant,
    pub last_sync_at: Option<Instant>,
    pub last_sync_position: f64,
}

impl PlaybackSession {
    pub fn new(session_id: impl Into<String>, item_id: impl Into<String>, started_at: Instant) -> Self {
        Self {
            session_id: session_id.into(),
            item_id: item_id.into(),
            started_at,
            last_sync_at: None,
            last_sync_position: 0.0,
        }
    }

    /// Seconds listened since the previous sync (or session start), then
    /// records `now` as the new origin.
    pub fn take_delta(&mut self, now: Instant, position: f64) -> f64 {
        let origin = self.last_sync_at.unwrap_or(self.started_at);
        let delta = now.saturating_duration_since(origin).as_secs_f64();
        self.last_sync_at = Some(now);
        self.last_sync_position = position;
        delta
    }

    /// Moves the delta origin to `now` without reporting anything.
    pub fn restart_clock(&mut self, now: Instant) {
        self.last_sync_at = Some(now);
    }
}

#[derive(Debug)]
enum SessionSlot {
    Empty,
    Starting {
        token: u64,
        item_id: String,
        listening_since: Instant,
    },
    Open(PlaybackSession),
}

/// Result of a session start request, fed back into the coordinator.
#[derive(Debug)]
pub struct StartOutcome {
    pub token: u64,
    pub item_id: String,
    pub result: bridge_traits::error::Result<StartedSession>,
}

/// What happened when a start outcome was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum StartResolution {
    Opened { session_id: String },
    /// The slot moved on while the request was in flight; the server-side
    /// session has been closed.
    Orphaned { session_id: String },
    Failed,
    Ignored,
}

/// Builds the durable progress payload for `position`.
pub fn progress_update(position: f64, duration: f64, finished_threshold: f64, now_ms: i64) -> ProgressUpdate {
    let progress = if duration > 0.0 {
        (position / duration).clamp(0.0, 1.0)
    } else {
        0.0
    };

    ProgressUpdate {
        current_time: position.max(0.0),
        duration,
        progress,
        is_finished: progress >= finished_threshold,
        last_update_ms: now_ms,
    }
}

pub struct SessionManager {
    server: Arc<dyn MediaServer>,
    events: EventBus,
    slot: SessionSlot,
    next_token: u64,
}

impl SessionManager {
    pub fn new(server: Arc<dyn MediaServer>, events: EventBus) -> Self {
        Self {
            server,
            events,
            slot: SessionSlot::Empty,
            next_token: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.slot, SessionSlot::Open(_))
    }

    pub fn session_id(&self) -> Option<&str> {
        match &self.slot {
            SessionSlot::Open(session) => Some(&session.session_id),
            _ => None,
        }
    }

    /// Item the held or pending session belongs to.
    pub fn item_id(&self) -> Option<&str> {
        match &self.slot {
            SessionSlot::Open(session) => Some(&session.item_id),
            SessionSlot::Starting { item_id, .. } => Some(item_id),
            SessionSlot::Empty => None,
        }
    }

    /// Opens a session for `item_id` unless one is held or already starting.
    ///
    /// `on_done` hands the outcome back to the owner and returns whether it
    /// was delivered. When it was not (the owner is gone), a session the
    /// server opened is closed from the request task.
    ///
    /// Returns `false` when nothing was started.
    pub fn ensure_started<F>(&mut self, item_id: &str, now: Instant, on_done: F) -> bool
    where
        F: FnOnce(StartOutcome) -> bool + Send + 'static,
    {
        if !matches!(self.slot, SessionSlot::Empty) {
            return false;
        }

        self.next_token += 1;
        let token = self.next_token;
        self.slot = SessionSlot::Starting {
            token,
            item_id: item_id.to_string(),
            listening_since: now,
        };

        let server = Arc::clone(&self.server);
        let events = self.events.clone();
        let item_id = item_id.to_string();
        debug!(item_id = %item_id, token, "Starting listening session");
        tokio::spawn(async move {
            let result = server.start_session(&item_id).await;
            let opened = result.as_ref().ok().map(|started| started.session_id.clone());
            let delivered = on_done(StartOutcome {
                token,
                item_id,
                result,
            });
            if let (false, Some(session_id)) = (delivered, opened) {
                debug!(session_id = %session_id, "Closing session opened after shutdown");
                close_session(server, events, session_id, None).await;
            }
        });
        true
    }

    /// Applies a start outcome. `listening` tells whether playback is active
    /// right now; when it is not, the delta clock starts at the next resume.
    pub fn complete_start(&mut self, outcome: StartOutcome, now: Instant, listening: bool) -> StartResolution {
        let pending = match &self.slot {
            SessionSlot::Starting {
                token,
                listening_since,
                ..
            } if *token == outcome.token => Some(*listening_since),
            _ => None,
        };

        match (pending, outcome.result) {
            (Some(listening_since), Ok(started)) => {
                let origin = if listening { listening_since } else { now };
                info!(
                    item_id = %outcome.item_id,
                    session_id = %started.session_id,
                    audio_tracks = started.audio_tracks.len(),
                    "Listening session opened"
                );
                self.events
                    .emit(CoreEvent::Session(SessionEvent::Opened {
                        item_id: outcome.item_id.clone(),
                        session_id: started.session_id.clone(),
                    }))
                    .ok();
                let session_id = started.session_id.clone();
                self.slot = SessionSlot::Open(PlaybackSession::new(
                    started.session_id,
                    outcome.item_id,
                    origin,
                ));
                StartResolution::Opened { session_id }
            }
            (Some(_), Err(err)) => {
                warn!(item_id = %outcome.item_id, error = %err, "Failed to start listening session");
                self.slot = SessionSlot::Empty;
                StartResolution::Failed
            }
            (None, Ok(started)) => {
                debug!(
                    item_id = %outcome.item_id,
                    session_id = %started.session_id,
                    "Closing orphaned session"
                );
                self.spawn_close(started.session_id.clone(), None);
                StartResolution::Orphaned {
                    session_id: started.session_id,
                }
            }
            (None, Err(_)) => StartResolution::Ignored,
        }
    }

    /// Restarts the listened-time clock on resume.
    pub fn resume(&mut self, now: Instant) {
        match &mut self.slot {
            SessionSlot::Open(session) => session.restart_clock(now),
            SessionSlot::Starting {
                listening_since, ..
            } => *listening_since = now,
            SessionSlot::Empty => {}
        }
    }

    /// Sends one session sync for `position` if a session is open.
    ///
    /// Returns `false` when there is no open session.
    pub fn sync(&mut self, now: Instant, position: f64, duration: f64) -> bool {
        let SessionSlot::Open(session) = &mut self.slot else {
            return false;
        };

        let sync = SessionSync {
            current_time: position,
            time_listened: session.take_delta(now, position),
            duration,
        };
        let session_id = session.session_id.clone();
        let server = Arc::clone(&self.server);
        let events = self.events.clone();

        tokio::spawn(async move {
            match server.sync_session(&session_id, sync).await {
                Ok(()) => {
                    debug!(
                        session_id = %session_id,
                        position = sync.current_time,
                        time_listened = sync.time_listened,
                        "Session synced"
                    );
                    events
                        .emit(CoreEvent::Session(SessionEvent::Synced {
                            session_id,
                            current_time: sync.current_time,
                            time_listened: sync.time_listened,
                        }))
                        .ok();
                }
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "Session sync failed");
                    events
                        .emit(CoreEvent::Session(SessionEvent::SyncFailed {
                            session_id,
                            message: err.to_string(),
                        }))
                        .ok();
                }
            }
        });
        true
    }

    /// Persists durable progress for `item_id`.
    pub fn save_progress(&self, item_id: &str, update: ProgressUpdate) {
        let server = Arc::clone(&self.server);
        let events = self.events.clone();
        let item_id = item_id.to_string();

        tokio::spawn(async move {
            match server.save_progress(&item_id, update).await {
                Ok(()) => {
                    debug!(
                        item_id = %item_id,
                        position = update.current_time,
                        is_finished = update.is_finished,
                        "Progress saved"
                    );
                    events
                        .emit(CoreEvent::Session(SessionEvent::ProgressSaved {
                            item_id,
                            current_time: update.current_time,
                            is_finished: update.is_finished,
                        }))
                        .ok();
                }
                Err(err) => {
                    warn!(item_id = %item_id, error = %err, "Progress save failed");
                    events
                        .emit(CoreEvent::Session(SessionEvent::ProgressSaveFailed {
                            item_id,
                            message: err.to_string(),
                        }))
                        .ok();
                }
            }
        });
    }

    /// Detaches the session and returns the final sync to send with the close.
    ///
    /// A pending start is abandoned; its outcome will be treated as orphaned.
    fn take_for_close(&mut self, now: Instant, position: f64, duration: f64) -> Option<(String, SessionSync)> {
        match std::mem::replace(&mut self.slot, SessionSlot::Empty) {
            SessionSlot::Open(mut session) => {
                let sync = SessionSync {
                    current_time: position,
                    time_listened: session.take_delta(now, position),
                    duration,
                };
                Some((session.session_id, sync))
            }
            _ => None,
        }
    }

    /// Closes the session in the background.
    pub fn close_detached(&mut self, now: Instant, position: f64, duration: f64) {
        if let Some((session_id, sync)) = self.take_for_close(now, position, duration) {
            self.spawn_close(session_id, Some(sync));
        }
    }

    /// Closes the session and waits for the server to answer.
    pub async fn close(&mut self, now: Instant, position: f64, duration: f64) {
        if let Some((session_id, sync)) = self.take_for_close(now, position, duration) {
            close_session(Arc::clone(&self.server), self.events.clone(), session_id, Some(sync)).await;
        }
    }

    fn spawn_close(&self, session_id: String, sync: Option<SessionSync>) {
        let server = Arc::clone(&self.server);
        let events = self.events.clone();
        tokio::spawn(close_session(server, events, session_id, sync));
    }
}

#[instrument(skip(server, events, sync))]
async fn close_session(
    server: Arc<dyn MediaServer>,
    events: EventBus,
    session_id: String,
    sync: Option<SessionSync>,
) {
    match server.close_session(&session_id, sync).await {
        Ok(()) => {
            info!("Listening session closed");
            events
                .emit(CoreEvent::Session(SessionEvent::Closed { session_id }))
                .ok();
        }
        Err(err) => warn!(error = %err, "Failed to close listening session"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn delta_is_wall_clock_since_last_sync() {
        let start = Instant::now();
        let mut session = PlaybackSession::new("sess-1", "li_1", start);

        assert_eq!(session.take_delta(start + Duration::from_secs(15), 300.0), 15.0);
        // Position jumped by a seek; the delta does not care
        assert_eq!(session.take_delta(start + Duration::from_secs(30), 12.0), 15.0);
        assert_eq!(session.last_sync_position, 12.0);
    }

    #[test]
    fn restarted_clock_excludes_paused_time() {
        let start = Instant::now();
        let mut session = PlaybackSession::new("sess-1", "li_1", start);

        session.take_delta(start + Duration::from_secs(10), 10.0);
        // Paused for 100s, then resumed
        session.restart_clock(start + Duration::from_secs(110));
        assert_eq!(session.take_delta(start + Duration::from_secs(115), 15.0), 5.0);
    }

    #[test]
    fn progress_marks_finished_at_threshold() {
        let update = progress_update(99.0, 100.0, 0.99, 1_700_000_000_000);
        assert!(update.is_finished);
        assert_eq!(update.progress, 0.99);
        assert_eq!(update.last_update_ms, 1_700_000_000_000);

        let update = progress_update(50.0, 100.0, 0.99, 0);
        assert!(!update.is_finished);
        assert_eq!(update.progress, 0.5);

        let update = progress_update(10.0, 0.0, 0.99, 0);
        assert_eq!(update.progress, 0.0);
        assert!(!update.is_finished);
    }
}
